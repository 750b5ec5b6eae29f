use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Vector3};

use super::{Factor, FactorError, FactorKind, FactorResult, GaussianNoise, check_params};
use crate::kinematics::ForwardKinematics;

/// Pulls the end effector (origin of the last link) toward a workspace point.
///
/// Residual: `R (p_ee(q) - destination)`, 3 entries.
#[derive(Debug)]
pub struct GoalFactor<FK: ForwardKinematics> {
    fk_model: Arc<FK>,
    destination: Vector3<f64>,
    noise: GaussianNoise,
}

impl<FK: ForwardKinematics> GoalFactor<FK> {
    pub fn new(fk_model: Arc<FK>, destination: Vector3<f64>, noise: GaussianNoise) -> FactorResult<Self> {
        if noise.dim() != 3 {
            return Err(FactorError::InvalidDimension {
                expected: 3,
                actual: noise.dim(),
            });
        }
        Ok(Self {
            fk_model,
            destination,
            noise,
        })
    }

    pub fn destination(&self) -> &Vector3<f64> {
        &self.destination
    }
}

impl<FK: ForwardKinematics> Factor for GoalFactor<FK> {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        check_params(params, &[self.fk_model.dof()])?;
        let (poses, jacobians) = self.fk_model.link_poses_with_jacobians(&params[0])?;
        let last = poses.len() - 1;
        let error = poses[last].translation.vector - self.destination;
        let residual = self.noise.whiten(&DVector::from_column_slice(error.as_slice()));

        let jacobian = compute_jacobian.then(|| {
            let linear = jacobians[last].fixed_rows::<3>(0);
            let dense = DMatrix::from_fn(3, linear.ncols(), |r, c| linear[(r, c)]);
            self.noise.whiten_jacobian(&dense)
        });
        Ok((residual, jacobian))
    }

    fn get_dimension(&self) -> usize {
        3
    }

    fn kind(&self) -> FactorKind {
        FactorKind::GoalDistance
    }
}
