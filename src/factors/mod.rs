//! Factor implementations for trajectory optimization
//!
//! Every factor maps the values of the variables it touches to a whitened
//! residual vector and, on request, the Jacobian of that residual with respect
//! to the concatenated variables. The optimizer minimizes `0.5 * sum ||r||^2`.
//!
//! # Module Structure
//!
//! - `noise_model`: Gaussian whitening (isotropic, diagonal, full covariance)
//! - `prior_factor`: soft prior on a configuration or velocity
//! - `gp_prior_factor`: Gaussian-process smoothness prior between two states
//! - `obstacle_factor`: hinge collision cost of one configuration against a distance field
//! - `gp_obstacle_factor`: collision cost at GP-interpolated configurations between two states
//! - `goal_factor`: end-effector reaching a point
//! - `limit_factor`: joint position and velocity limits

use nalgebra::{DMatrix, DVector};
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::gp::GpError;
use crate::kinematics::KinematicsError;

pub mod goal_factor;
pub mod gp_obstacle_factor;
pub mod gp_prior_factor;
pub mod limit_factor;
pub mod noise_model;
pub mod obstacle_factor;
pub mod prior_factor;

pub use goal_factor::GoalFactor;
pub use gp_obstacle_factor::{
    InterpolatedObstacleFactor, ObstaclePlanarSdfFactorGpArm, ObstaclePlanarSdfFactorGpPointRobot,
    ObstacleSdfFactorGpArm,
};
pub use gp_prior_factor::GaussianProcessPriorFactor;
pub use limit_factor::{JointLimitFactor, VelocityLimitFactor, hinge_loss_limit_cost};
pub use noise_model::GaussianNoise;
pub use obstacle_factor::{
    ObstacleFactor, ObstaclePlanarSdfFactorArm, ObstaclePlanarSdfFactorPointRobot,
    ObstacleSdfFactorArm,
};
pub use prior_factor::PriorFactor;

#[cfg(test)]
mod tests;

/// Factor-specific error types
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// Input vector or matrix does not have the expected size
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// Wrong number of variables handed to a factor
    #[error("Factor expects {expected} variables, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// Noise model could not be built (non-positive sigma, indefinite covariance)
    #[error("Invalid noise model: {0}")]
    InvalidNoiseModel(String),

    /// Invalid construction parameters
    #[error("Invalid factor parameters: {0}")]
    InvalidParameters(String),

    /// Robot kinematics failed while linearizing
    #[error("Kinematics failure: {0}")]
    Kinematics(#[from] KinematicsError),

    /// Gaussian-process model could not be built
    #[error("Gaussian process model: {0}")]
    GaussianProcess(#[from] GpError),
}

impl FactorError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for factor operations
pub type FactorResult<T> = Result<T, FactorError>;

/// Closed set of factor roles used when assembling and inspecting trajectory graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactorKind {
    Prior,
    GaussianProcessPrior,
    Obstacle,
    InterpolatedObstacle,
    GoalDistance,
    JointLimit,
    VelocityLimit,
}

impl FactorKind {
    /// Whether the factor measures collision cost
    pub fn is_collision(&self) -> bool {
        matches!(self, FactorKind::Obstacle | FactorKind::InterpolatedObstacle)
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FactorKind::Prior => "prior",
            FactorKind::GaussianProcessPrior => "gp-prior",
            FactorKind::Obstacle => "obstacle",
            FactorKind::InterpolatedObstacle => "gp-obstacle",
            FactorKind::GoalDistance => "goal",
            FactorKind::JointLimit => "joint-limit",
            FactorKind::VelocityLimit => "velocity-limit",
        };
        write!(f, "{name}")
    }
}

/// Residual term of the trajectory factor graph.
pub trait Factor: Send + Sync {
    /// Compute the whitened residual and, if requested, its Jacobian.
    ///
    /// The Jacobian has `get_dimension()` rows and one column block per variable in
    /// `params`, in order.
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)>;

    /// Residual dimension
    fn get_dimension(&self) -> usize;

    /// Role of the factor in the graph
    fn kind(&self) -> FactorKind;
}

/// Check the number and sizes of the variables handed to a factor.
pub(crate) fn check_params(params: &[DVector<f64>], dims: &[usize]) -> FactorResult<()> {
    if params.len() != dims.len() {
        return Err(FactorError::ParameterCount {
            expected: dims.len(),
            actual: params.len(),
        });
    }
    for (p, &d) in params.iter().zip(dims) {
        if p.len() != d {
            return Err(FactorError::InvalidDimension {
                expected: d,
                actual: p.len(),
            });
        }
    }
    Ok(())
}
