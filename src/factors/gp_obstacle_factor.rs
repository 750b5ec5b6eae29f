use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::obstacle_factor::{check_epsilon, sphere_hinge_errors};
use super::{Factor, FactorError, FactorKind, FactorResult, GaussianNoise, check_params};
use crate::gp::GaussianProcessInterpolator;
use crate::kinematics::{Arm, ForwardKinematics, PointRobot, RobotModel};
use crate::obstacle::{DistanceField, PlanarSdf, SignedDistanceField};

/// Collision cost at Gaussian-process interpolated configurations between two states.
///
/// Variables: `[q1, v1, q2, v2]`. For every check time `tau` the configuration
/// `q(tau)` is interpolated with the GP posterior mean and charged the same
/// per-sphere hinge cost as [`super::ObstacleFactor`]; the residual stacks one
/// block of `nr_body_spheres` entries per check time.
#[derive(Debug)]
pub struct InterpolatedObstacleFactor<FK: ForwardKinematics, F: DistanceField> {
    robot: Arc<RobotModel<FK>>,
    field: Arc<F>,
    epsilon: f64,
    interpolators: Vec<GaussianProcessInterpolator>,
    noise: GaussianNoise,
}

/// Arm against a 3D signed distance field, between support states
pub type ObstacleSdfFactorGpArm = InterpolatedObstacleFactor<Arm, SignedDistanceField>;
/// Arm against a planar signed distance field, between support states
pub type ObstaclePlanarSdfFactorGpArm = InterpolatedObstacleFactor<Arm, PlanarSdf>;
/// Point robot against a planar signed distance field, between support states
pub type ObstaclePlanarSdfFactorGpPointRobot = InterpolatedObstacleFactor<PointRobot, PlanarSdf>;

impl<FK: ForwardKinematics, F: DistanceField> InterpolatedObstacleFactor<FK, F> {
    /// Factor checking the explicit list of times `taus`, each within `[0, delta]`.
    pub fn new(
        robot: Arc<RobotModel<FK>>,
        field: Arc<F>,
        cost_sigma: f64,
        epsilon: f64,
        qc: &DMatrix<f64>,
        delta: f64,
        taus: &[f64],
    ) -> FactorResult<Self> {
        check_epsilon(epsilon)?;
        if taus.is_empty() {
            return Err(FactorError::InvalidParameters(
                "interpolated obstacle factor needs at least one check time".to_string(),
            ));
        }
        if qc.nrows() != robot.dof() {
            return Err(FactorError::InvalidDimension {
                expected: robot.dof(),
                actual: qc.nrows(),
            });
        }
        let interpolators = taus
            .iter()
            .map(|&tau| GaussianProcessInterpolator::new(qc, delta, tau))
            .collect::<Result<Vec<_>, _>>()?;
        let noise = GaussianNoise::isotropic(robot.nr_body_spheres() * taus.len(), cost_sigma)?;
        Ok(Self {
            robot,
            field,
            epsilon,
            interpolators,
            noise,
        })
    }

    /// Factor checking `check_inter` evenly spaced interior times,
    /// `tau_j = j * delta / (check_inter + 1)` for `j = 1..=check_inter`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_check_points(
        robot: Arc<RobotModel<FK>>,
        field: Arc<F>,
        cost_sigma: f64,
        epsilon: f64,
        qc: &DMatrix<f64>,
        delta: f64,
        check_inter: usize,
    ) -> FactorResult<Self> {
        let step = delta / (check_inter + 1) as f64;
        let taus: Vec<f64> = (1..=check_inter).map(|j| j as f64 * step).collect();
        Self::new(robot, field, cost_sigma, epsilon, qc, delta, &taus)
    }

    pub fn taus(&self) -> Vec<f64> {
        self.interpolators.iter().map(|i| i.tau()).collect()
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<FK: ForwardKinematics, F: DistanceField> Factor for InterpolatedObstacleFactor<FK, F> {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        let dof = self.robot.dof();
        check_params(params, &[dof, dof, dof, dof])?;
        let (q1, v1, q2, v2) = (&params[0], &params[1], &params[2], &params[3]);

        let n_spheres = self.robot.nr_body_spheres();
        let mut error = DVector::zeros(self.get_dimension());
        let mut jacobian = compute_jacobian.then(|| DMatrix::zeros(self.get_dimension(), 4 * dof));

        for (k, interpolator) in self.interpolators.iter().enumerate() {
            let conf = interpolator.interpolate_pose(q1, v1, q2, v2)?;
            let (block_error, block_jacobian) = sphere_hinge_errors(
                &self.robot,
                self.field.as_ref(),
                &conf,
                self.epsilon,
                compute_jacobian,
            )?;
            let row = k * n_spheres;
            error.rows_mut(row, n_spheres).copy_from(&block_error);

            if let (Some(jacobian), Some(h)) = (jacobian.as_mut(), block_jacobian) {
                // q(tau) = Lambda_q [q1; v1] + Psi_q [q2; v2]
                let (lambda_q, psi_q) = interpolator.pose_rows();
                jacobian
                    .view_mut((row, 0), (n_spheres, 2 * dof))
                    .copy_from(&(&h * lambda_q));
                jacobian
                    .view_mut((row, 2 * dof), (n_spheres, 2 * dof))
                    .copy_from(&(&h * psi_q));
            }
        }

        Ok((
            self.noise.whiten(&error),
            jacobian.map(|j| self.noise.whiten_jacobian(&j)),
        ))
    }

    fn get_dimension(&self) -> usize {
        self.robot.nr_body_spheres() * self.interpolators.len()
    }

    fn kind(&self) -> FactorKind {
        FactorKind::InterpolatedObstacle
    }
}
