//! Optimization solvers for nonlinear least squares problems.
//!
//! This module provides the iterative drivers used by the trajectory planners:
//! - Levenberg-Marquardt algorithm
//! - Gauss-Newton algorithm
//! - Dog Leg algorithm
//!
//! All of them minimize `0.5 * ||r(x)||^2` over the free variables of a
//! [`Problem`], solving one sparse linear system per iteration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use faer::Mat;
use thiserror::Error;
use tracing::error;

use crate::core::{Problem, ProblemError, Values};
use crate::linalg::{LinearSolverType, SparseMatrix, dot, sparse_mul_vec};

pub mod dog_leg;
pub mod gauss_newton;
pub mod levenberg_marquardt;

pub use dog_leg::{DogLeg, DogLegSummary};
pub use gauss_newton::{GaussNewton, GaussNewtonSummary};
pub use levenberg_marquardt::{LevenbergMarquardt, LevenbergMarquardtSummary};

/// Type of optimization solver algorithm to use
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerType {
    /// Levenberg-Marquardt algorithm (robust, adaptive damping)
    #[default]
    LevenbergMarquardt,
    /// Gauss-Newton algorithm (fast convergence, may be unstable)
    GaussNewton,
    /// Dog Leg algorithm (trust region method)
    DogLeg,
}

impl fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerType::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
            OptimizerType::GaussNewton => write!(f, "Gauss-Newton"),
            OptimizerType::DogLeg => write!(f, "Dog Leg"),
        }
    }
}

impl FromStr for OptimizerType {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "lm" | "levenbergmarquardt" => Ok(OptimizerType::LevenbergMarquardt),
            "gn" | "gaussnewton" => Ok(OptimizerType::GaussNewton),
            "dl" | "dogleg" => Ok(OptimizerType::DogLeg),
            _ => Err(OptimizerError::InvalidConfig(format!(
                "unknown optimizer '{s}', expected one of lm, gn, dogleg"
            ))),
        }
    }
}

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// The problem could not be evaluated
    #[error("Problem evaluation failed: {0}")]
    Problem(#[from] ProblemError),

    /// Invalid solver configuration
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Configuration parameters shared by every optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Type of linear solver for the linear systems
    pub linear_solver_type: LinearSolverType,
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative cost decrease below which an accepted step ends the solve
    pub cost_tolerance: f64,
    /// Cost below which the problem counts as solved
    pub absolute_cost_tolerance: f64,
    /// Relative parameter update norm below which the solve stops
    pub parameter_tolerance: f64,
    /// Convergence tolerance for gradient norm
    pub gradient_tolerance: f64,
    /// Return the lowest-cost estimate instead of a final cost-increasing one
    pub final_iter_no_increase: bool,
    /// Timeout duration
    pub timeout: Option<Duration>,
    /// Enable detailed logging
    pub verbose: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            linear_solver_type: LinearSolverType::default(),
            max_iterations: 100,
            cost_tolerance: 1e-8,
            absolute_cost_tolerance: 1e-12,
            parameter_tolerance: 1e-8,
            gradient_tolerance: 1e-8,
            final_iter_no_increase: true,
            timeout: None,
            verbose: false,
        }
    }
}

impl OptimizerConfig {
    /// Create a new solver configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the linear solver type
    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    /// Set the maximum number of iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative cost tolerance
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Set the absolute cost tolerance
    pub fn with_absolute_cost_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_cost_tolerance = tolerance;
        self
    }

    /// Set the parameter tolerance
    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    /// Set the gradient tolerance
    pub fn with_gradient_tolerance(mut self, gradient_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    /// Roll back a final cost-increasing iteration
    pub fn with_final_iter_no_increase(mut self, enabled: bool) -> Self {
        self.final_iter_no_increase = enabled;
        self
    }

    /// Set the timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn validate(&self) -> OptimizerResult<()> {
        if self.max_iterations == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("cost_tolerance", self.cost_tolerance),
            ("absolute_cost_tolerance", self.absolute_cost_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(OptimizerError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Detailed convergence information.
#[derive(Debug, Clone)]
pub struct ConvergenceInfo {
    /// Final gradient norm
    pub final_gradient_norm: f64,
    /// Final parameter update norm
    pub final_parameter_update_norm: f64,
    /// Cost function evaluation count
    pub cost_evaluations: usize,
    /// Jacobian evaluation count
    pub jacobian_evaluations: usize,
}

impl fmt::Display for ConvergenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final gradient norm: {:.2e}, Final parameter update norm: {:.2e}, Cost evaluations: {}, Jacobian evaluations: {}",
            self.final_gradient_norm,
            self.final_parameter_update_norm,
            self.cost_evaluations,
            self.jacobian_evaluations
        )
    }
}

/// Status of an optimization process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Optimization converged successfully
    Converged,
    /// Maximum number of iterations reached
    MaxIterationsReached,
    /// Cost function tolerance reached
    CostToleranceReached,
    /// Parameter tolerance reached
    ParameterToleranceReached,
    /// Gradient tolerance reached
    GradientToleranceReached,
    /// The last step raised the cost and was rolled back
    CostIncreased,
    /// Optimization failed due to numerical issues
    NumericalFailure,
    /// User requested termination
    UserTerminated,
    /// Timeout reached
    Timeout,
    /// Other failure
    Failed(String),
}

impl OptimizationStatus {
    /// Whether the solve stopped on a convergence criterion
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Converged
                | OptimizationStatus::CostToleranceReached
                | OptimizationStatus::ParameterToleranceReached
                | OptimizationStatus::GradientToleranceReached
        )
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::CostToleranceReached => write!(f, "Cost tolerance reached"),
            OptimizationStatus::ParameterToleranceReached => {
                write!(f, "Parameter tolerance reached")
            }
            OptimizationStatus::GradientToleranceReached => write!(f, "Gradient tolerance reached"),
            OptimizationStatus::CostIncreased => write!(f, "Cost increased, last step rolled back"),
            OptimizationStatus::NumericalFailure => write!(f, "Numerical failure"),
            OptimizationStatus::UserTerminated => write!(f, "User terminated"),
            OptimizationStatus::Timeout => write!(f, "Timeout"),
            OptimizationStatus::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// Result of a solver execution.
#[derive(Debug, Clone)]
pub struct SolverResult<T> {
    /// Final parameters
    pub parameters: T,
    /// Final optimization status
    pub status: OptimizationStatus,
    /// Initial cost value
    pub init_cost: f64,
    /// Final cost value
    pub final_cost: f64,
    /// Number of iterations performed
    pub iterations: usize,
    /// Total time elapsed
    pub elapsed_time: Duration,
    /// Convergence statistics
    pub convergence_info: Option<ConvergenceInfo>,
}

/// Core trait for optimization solvers.
pub trait Solver {
    /// Minimize the problem starting from `initial_values`.
    ///
    /// Non-convergence is reported through [`SolverResult::status`]; only a
    /// problem that cannot be evaluated at all is an error.
    fn optimize(
        &mut self,
        problem: &Problem,
        initial_values: &Values,
    ) -> OptimizerResult<SolverResult<Values>>;
}

/// Any of the built-in optimizers, selected at runtime.
#[derive(Debug, Clone)]
pub enum AnySolver {
    GaussNewton(GaussNewton),
    LevenbergMarquardt(LevenbergMarquardt),
    DogLeg(DogLeg),
}

impl AnySolver {
    pub fn new(optimizer_type: OptimizerType, config: OptimizerConfig) -> Self {
        match optimizer_type {
            OptimizerType::GaussNewton => AnySolver::GaussNewton(GaussNewton::with_config(config)),
            OptimizerType::LevenbergMarquardt => {
                AnySolver::LevenbergMarquardt(LevenbergMarquardt::with_config(config))
            }
            OptimizerType::DogLeg => AnySolver::DogLeg(DogLeg::with_config(config)),
        }
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        match self {
            AnySolver::GaussNewton(_) => OptimizerType::GaussNewton,
            AnySolver::LevenbergMarquardt(_) => OptimizerType::LevenbergMarquardt,
            AnySolver::DogLeg(_) => OptimizerType::DogLeg,
        }
    }
}

impl Solver for AnySolver {
    fn optimize(
        &mut self,
        problem: &Problem,
        initial_values: &Values,
    ) -> OptimizerResult<SolverResult<Values>> {
        match self {
            AnySolver::GaussNewton(s) => s.optimize(problem, initial_values),
            AnySolver::LevenbergMarquardt(s) => s.optimize(problem, initial_values),
            AnySolver::DogLeg(s) => s.optimize(problem, initial_values),
        }
    }
}

/// Decrease of `0.5 ||r + J dx||^2` relative to `0.5 ||r||^2`, i.e.
/// `-(g^T dx + 0.5 ||J dx||^2)` with `g = J^T r`.
pub(crate) fn predicted_reduction(gradient: &Mat<f64>, jacobian: &SparseMatrix, step: &Mat<f64>) -> f64 {
    let j_step = sparse_mul_vec(jacobian, step);
    -(dot(gradient, step) + 0.5 * dot(&j_step, &j_step))
}

/// Ratio of actual to predicted cost reduction
pub(crate) fn step_quality(current_cost: f64, new_cost: f64, predicted: f64) -> f64 {
    let actual = current_cost - new_cost;
    if predicted.abs() < 1e-15 {
        if actual > 0.0 { 1.0 } else { 0.0 }
    } else {
        actual / predicted
    }
}

/// Relative cost decrease test applied after an accepted step
pub(crate) fn cost_converged(previous_cost: f64, new_cost: f64, config: &OptimizerConfig) -> Option<OptimizationStatus> {
    if new_cost <= config.absolute_cost_tolerance {
        return Some(OptimizationStatus::Converged);
    }
    if (previous_cost - new_cost).abs() <= config.cost_tolerance * previous_cost {
        return Some(OptimizationStatus::CostToleranceReached);
    }
    None
}

/// Relative step size test
pub(crate) fn step_converged(step_norm: f64, values: &Values, config: &OptimizerConfig) -> bool {
    step_norm <= config.parameter_tolerance * (values.norm() + config.parameter_tolerance)
}
