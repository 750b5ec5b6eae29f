use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{Factor, FactorError, FactorKind, FactorResult, GaussianNoise, check_params};
use crate::kinematics::{Arm, ForwardKinematics, PointRobot, RobotModel};
use crate::obstacle::{DistanceField, PlanarSdf, SignedDistanceField, hinge_loss_obstacle_cost};

/// Collision cost of a single configuration.
///
/// One residual per body sphere: `max(0, radius + epsilon - sdf(center))`,
/// whitened by `cost_sigma`. Residuals of spheres farther than the safety
/// margin from every obstacle are exactly zero, as are their Jacobian rows.
#[derive(Debug)]
pub struct ObstacleFactor<FK: ForwardKinematics, F: DistanceField> {
    robot: Arc<RobotModel<FK>>,
    field: Arc<F>,
    epsilon: f64,
    noise: GaussianNoise,
}

/// Arm against a 3D signed distance field
pub type ObstacleSdfFactorArm = ObstacleFactor<Arm, SignedDistanceField>;
/// Arm against a planar signed distance field
pub type ObstaclePlanarSdfFactorArm = ObstacleFactor<Arm, PlanarSdf>;
/// Point robot against a planar signed distance field
pub type ObstaclePlanarSdfFactorPointRobot = ObstacleFactor<PointRobot, PlanarSdf>;

impl<FK: ForwardKinematics, F: DistanceField> ObstacleFactor<FK, F> {
    pub fn new(
        robot: Arc<RobotModel<FK>>,
        field: Arc<F>,
        cost_sigma: f64,
        epsilon: f64,
    ) -> FactorResult<Self> {
        check_epsilon(epsilon)?;
        let noise = GaussianNoise::isotropic(robot.nr_body_spheres(), cost_sigma)?;
        Ok(Self {
            robot,
            field,
            epsilon,
            noise,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Unwhitened hinge errors of every sphere
    pub fn evaluate_error(&self, conf: &DVector<f64>) -> FactorResult<DVector<f64>> {
        Ok(sphere_hinge_errors(&self.robot, self.field.as_ref(), conf, self.epsilon, false)?.0)
    }
}

impl<FK: ForwardKinematics, F: DistanceField> Factor for ObstacleFactor<FK, F> {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        check_params(params, &[self.robot.dof()])?;
        let (error, jacobian) = sphere_hinge_errors(
            &self.robot,
            self.field.as_ref(),
            &params[0],
            self.epsilon,
            compute_jacobian,
        )?;
        Ok((
            self.noise.whiten(&error),
            jacobian.map(|j| self.noise.whiten_jacobian(&j)),
        ))
    }

    fn get_dimension(&self) -> usize {
        self.robot.nr_body_spheres()
    }

    fn kind(&self) -> FactorKind {
        FactorKind::Obstacle
    }
}

pub(crate) fn check_epsilon(epsilon: f64) -> FactorResult<()> {
    if !(epsilon.is_finite() && epsilon >= 0.0) {
        return Err(FactorError::InvalidParameters(format!(
            "obstacle safety distance must be non-negative, got {epsilon}"
        )));
    }
    Ok(())
}

/// Hinge errors of all spheres at `conf` and, optionally, their `nr_spheres x dof` Jacobian.
pub(crate) fn sphere_hinge_errors<FK: ForwardKinematics, F: DistanceField + ?Sized>(
    robot: &RobotModel<FK>,
    field: &F,
    conf: &DVector<f64>,
    epsilon: f64,
    compute_jacobian: bool,
) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
    let n_spheres = robot.nr_body_spheres();
    let mut error = DVector::zeros(n_spheres);

    if !compute_jacobian {
        let centers = robot.sphere_centers(conf)?;
        for (i, (center, sphere)) in centers.iter().zip(robot.body_spheres()).enumerate() {
            error[i] = hinge_loss_obstacle_cost(center, field, sphere.radius + epsilon).0;
        }
        return Ok((error, None));
    }

    let (centers, center_jacobians) = robot.sphere_centers_with_jacobians(conf)?;
    let mut jacobian = DMatrix::zeros(n_spheres, robot.dof());
    for (i, sphere) in robot.body_spheres().iter().enumerate() {
        let (cost, gradient) = hinge_loss_obstacle_cost(&centers[i], field, sphere.radius + epsilon);
        error[i] = cost;
        if cost > 0.0 {
            jacobian
                .row_mut(i)
                .copy_from(&(gradient.transpose() * &center_jacobians[i]));
        }
    }
    Ok((error, Some(jacobian)))
}
