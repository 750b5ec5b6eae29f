use nalgebra::{DMatrix, DVector};

use super::{Factor, FactorKind, FactorResult, GaussianNoise, check_params};
use crate::gp::{GpError, calc_q_inv, qc_inverse};

/// Constant-velocity Gaussian-process prior between two consecutive states.
///
/// Variables: `[q1, v1, q2, v2]`. The unwhitened error is
/// `[q2 - q1 - delta v1; v2 - v1]` and is whitened with the inverse of `Q(delta)`.
#[derive(Debug, Clone)]
pub struct GaussianProcessPriorFactor {
    dof: usize,
    delta: f64,
    noise: GaussianNoise,
}

impl GaussianProcessPriorFactor {
    pub fn new(qc: &DMatrix<f64>, delta: f64) -> FactorResult<Self> {
        let qc_inv = qc_inverse(qc)?;
        if !(delta.is_finite() && delta > 0.0) {
            return Err(GpError::InvalidDelta(delta).into());
        }
        let noise = GaussianNoise::from_information(&calc_q_inv(&qc_inv, delta))?;
        Ok(Self {
            dof: qc.nrows(),
            delta,
            noise,
        })
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Unwhitened prior error
    pub fn evaluate_error(
        &self,
        q1: &DVector<f64>,
        v1: &DVector<f64>,
        q2: &DVector<f64>,
        v2: &DVector<f64>,
    ) -> DVector<f64> {
        let n = self.dof;
        let mut error = DVector::zeros(2 * n);
        error
            .rows_mut(0, n)
            .copy_from(&(q2 - q1 - v1 * self.delta));
        error.rows_mut(n, n).copy_from(&(v2 - v1));
        error
    }

    fn raw_jacobian(&self) -> DMatrix<f64> {
        let n = self.dof;
        let mut jacobian = DMatrix::zeros(2 * n, 4 * n);
        for i in 0..n {
            // d/dq1
            jacobian[(i, i)] = -1.0;
            // d/dv1
            jacobian[(i, n + i)] = -self.delta;
            jacobian[(n + i, n + i)] = -1.0;
            // d/dq2
            jacobian[(i, 2 * n + i)] = 1.0;
            // d/dv2
            jacobian[(n + i, 3 * n + i)] = 1.0;
        }
        jacobian
    }
}

impl Factor for GaussianProcessPriorFactor {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        let n = self.dof;
        check_params(params, &[n, n, n, n])?;
        let error = self.evaluate_error(&params[0], &params[1], &params[2], &params[3]);
        let residual = self.noise.whiten(&error);
        let jacobian = compute_jacobian.then(|| self.noise.whiten_jacobian(&self.raw_jacobian()));
        Ok((residual, jacobian))
    }

    fn get_dimension(&self) -> usize {
        2 * self.dof
    }

    fn kind(&self) -> FactorKind {
        FactorKind::GaussianProcessPrior
    }
}
