//! Gaussian-process state interpolation inside one support interval.
//!
//! For support states `x1` at time 0 and `x2` at time `delta`, the posterior mean
//! at `tau` is `x(tau) = Lambda x1 + Psi x2` with
//!
//! ```text
//! Psi    = Q(tau) Phi(delta - tau)^T Q(delta)^-1
//! Lambda = Phi(tau) - Psi Phi(delta)
//! ```
//!
//! Both matrices are constant for a given `(Qc, delta, tau)`, so they are computed once.

use nalgebra::{DMatrix, DMatrixView, DVector};

use super::{GpError, GpResult, calc_phi, calc_q, calc_q_inv, qc_inverse};

#[derive(Debug, Clone)]
pub struct GaussianProcessInterpolator {
    dof: usize,
    delta: f64,
    tau: f64,
    lambda: DMatrix<f64>,
    psi: DMatrix<f64>,
}

impl GaussianProcessInterpolator {
    /// # Errors
    /// `InvalidQc`, `InvalidDelta` or `TauOutOfRange` when the inputs do not describe
    /// a point inside a valid interval.
    pub fn new(qc: &DMatrix<f64>, delta: f64, tau: f64) -> GpResult<Self> {
        let qc_inv = qc_inverse(qc)?;
        if !(delta.is_finite() && delta > 0.0) {
            return Err(GpError::InvalidDelta(delta));
        }
        if !(0.0..=delta).contains(&tau) {
            return Err(GpError::TauOutOfRange { tau, delta });
        }
        let dof = qc.nrows();

        let phi_delta = calc_phi(dof, delta);
        let psi = calc_q(qc, tau)
            * calc_phi(dof, delta - tau).transpose()
            * calc_q_inv(&qc_inv, delta);
        let lambda = calc_phi(dof, tau) - &psi * phi_delta;

        Ok(Self {
            dof,
            delta,
            tau,
            lambda,
            psi,
        })
    }

    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Weight of the first support state, `2 dof x 2 dof`
    pub fn lambda(&self) -> &DMatrix<f64> {
        &self.lambda
    }

    /// Weight of the second support state, `2 dof x 2 dof`
    pub fn psi(&self) -> &DMatrix<f64> {
        &self.psi
    }

    /// Rows of `[Lambda | Psi]` producing the interpolated pose
    pub fn pose_rows(&self) -> (DMatrixView<'_, f64>, DMatrixView<'_, f64>) {
        (
            self.lambda.rows(0, self.dof),
            self.psi.rows(0, self.dof),
        )
    }

    /// Rows of `[Lambda | Psi]` producing the interpolated velocity
    pub fn velocity_rows(&self) -> (DMatrixView<'_, f64>, DMatrixView<'_, f64>) {
        (
            self.lambda.rows(self.dof, self.dof),
            self.psi.rows(self.dof, self.dof),
        )
    }

    fn check(&self, v: &DVector<f64>) -> GpResult<()> {
        if v.len() != self.dof {
            return Err(GpError::DimensionMismatch {
                expected: self.dof,
                actual: v.len(),
            });
        }
        Ok(())
    }

    /// Interpolated state `[q; v]` at `tau`.
    pub fn interpolate_state(
        &self,
        pose1: &DVector<f64>,
        vel1: &DVector<f64>,
        pose2: &DVector<f64>,
        vel2: &DVector<f64>,
    ) -> GpResult<DVector<f64>> {
        for v in [pose1, vel1, pose2, vel2] {
            self.check(v)?;
        }
        let x1 = stack(pose1, vel1);
        let x2 = stack(pose2, vel2);
        Ok(&self.lambda * x1 + &self.psi * x2)
    }

    pub fn interpolate_pose(
        &self,
        pose1: &DVector<f64>,
        vel1: &DVector<f64>,
        pose2: &DVector<f64>,
        vel2: &DVector<f64>,
    ) -> GpResult<DVector<f64>> {
        let state = self.interpolate_state(pose1, vel1, pose2, vel2)?;
        Ok(state.rows(0, self.dof).into_owned())
    }

    pub fn interpolate_velocity(
        &self,
        pose1: &DVector<f64>,
        vel1: &DVector<f64>,
        pose2: &DVector<f64>,
        vel2: &DVector<f64>,
    ) -> GpResult<DVector<f64>> {
        let state = self.interpolate_state(pose1, vel1, pose2, vel2)?;
        Ok(state.rows(self.dof, self.dof).into_owned())
    }
}

fn stack(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(a.len() + b.len());
    out.rows_mut(0, a.len()).copy_from(a);
    out.rows_mut(a.len(), b.len()).copy_from(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> [DVector<f64>; 4] {
        [
            DVector::from_vec(vec![0.1, -0.4]),
            DVector::from_vec(vec![0.5, 0.2]),
            DVector::from_vec(vec![0.7, -0.1]),
            DVector::from_vec(vec![0.3, 0.6]),
        ]
    }

    #[test]
    fn test_endpoints() {
        let qc = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 0.5]);
        let [p1, v1, p2, v2] = states();

        let start = GaussianProcessInterpolator::new(&qc, 0.8, 0.0).unwrap();
        assert!((start.interpolate_pose(&p1, &v1, &p2, &v2).unwrap() - &p1).amax() < 1e-12);
        assert!((start.interpolate_velocity(&p1, &v1, &p2, &v2).unwrap() - &v1).amax() < 1e-12);

        let end = GaussianProcessInterpolator::new(&qc, 0.8, 0.8).unwrap();
        assert!((end.interpolate_pose(&p1, &v1, &p2, &v2).unwrap() - &p2).amax() < 1e-9);
        assert!((end.interpolate_velocity(&p1, &v1, &p2, &v2).unwrap() - &v2).amax() < 1e-9);
    }

    #[test]
    fn test_constant_velocity_is_exact() {
        // the prior mean is constant velocity, so a constant-velocity segment is reproduced
        let qc = DMatrix::identity(2, 2);
        let v = DVector::from_vec(vec![0.5, -1.0]);
        let p1 = DVector::from_vec(vec![0.0, 1.0]);
        let p2 = &p1 + &v * 2.0;
        let inter = GaussianProcessInterpolator::new(&qc, 2.0, 0.7).unwrap();
        let pose = inter.interpolate_pose(&p1, &v, &p2, &v).unwrap();
        assert!((pose - (&p1 + &v * 0.7)).amax() < 1e-9);
        let vel = inter.interpolate_velocity(&p1, &v, &p2, &v).unwrap();
        assert!((vel - &v).amax() < 1e-9);
    }

    #[test]
    fn test_tau_out_of_range() {
        let qc = DMatrix::identity(1, 1);
        assert!(matches!(
            GaussianProcessInterpolator::new(&qc, 1.0, 1.5),
            Err(GpError::TauOutOfRange { .. })
        ));
        assert!(matches!(
            GaussianProcessInterpolator::new(&qc, 0.0, 0.0),
            Err(GpError::InvalidDelta(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let qc = DMatrix::identity(2, 2);
        let inter = GaussianProcessInterpolator::new(&qc, 1.0, 0.5).unwrap();
        let short = DVector::zeros(1);
        let ok = DVector::zeros(2);
        assert!(inter.interpolate_pose(&short, &ok, &ok, &ok).is_err());
    }
}
