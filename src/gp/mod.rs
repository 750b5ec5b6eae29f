//! Gaussian-process motion prior with white noise on acceleration.
//!
//! For state `x = [q; v]` of a system with `dof` joints and power spectral
//! density `Qc`, the transition over an interval `tau` is
//!
//! ```text
//! Phi(tau) = | I  tau*I |      Q(tau) = | tau^3/3 Qc  tau^2/2 Qc |
//!            | 0    I   |               | tau^2/2 Qc    tau Qc   |
//! ```
//!
//! The prior factor and the interpolator are both built from these blocks.

use nalgebra::DMatrix;
use thiserror::Error;
use tracing::error;

pub mod interpolator;

pub use interpolator::GaussianProcessInterpolator;

/// Gaussian-process specific error types
#[derive(Debug, Clone, Error)]
pub enum GpError {
    /// Qc is not a square, symmetric positive definite matrix
    #[error("Invalid power spectral density: {0}")]
    InvalidQc(String),

    /// Interval length must be positive
    #[error("Invalid interval: delta must be positive, got {0}")]
    InvalidDelta(f64),

    /// Interpolation point outside [0, delta]
    #[error("Interpolation time tau={tau} outside [0, {delta}]")]
    TauOutOfRange { tau: f64, delta: f64 },

    /// State vectors do not match the model DOF
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl GpError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for Gaussian-process operations
pub type GpResult<T> = Result<T, GpError>;

/// Check that `qc` is square, symmetric and positive definite and return its inverse.
pub fn qc_inverse(qc: &DMatrix<f64>) -> GpResult<DMatrix<f64>> {
    if qc.nrows() == 0 || qc.nrows() != qc.ncols() {
        return Err(GpError::InvalidQc(format!(
            "expected a non-empty square matrix, got {}x{}",
            qc.nrows(),
            qc.ncols()
        )));
    }
    let asymmetry = (qc - qc.transpose()).amax();
    if asymmetry > 1e-9 * qc.amax().max(1.0) {
        return Err(GpError::InvalidQc(format!(
            "matrix is not symmetric (max asymmetry {asymmetry:.3e})"
        )));
    }
    qc.clone()
        .cholesky()
        .map(|chol| chol.inverse())
        .ok_or_else(|| GpError::InvalidQc("matrix is not positive definite".to_string()))
}

/// State transition matrix `Phi(tau)` of size `2 dof x 2 dof`.
pub fn calc_phi(dof: usize, tau: f64) -> DMatrix<f64> {
    let mut phi = DMatrix::identity(2 * dof, 2 * dof);
    for i in 0..dof {
        phi[(i, dof + i)] = tau;
    }
    phi
}

/// Process noise covariance `Q(tau)` accumulated over an interval.
pub fn calc_q(qc: &DMatrix<f64>, tau: f64) -> DMatrix<f64> {
    block_2x2(
        qc,
        tau.powi(3) / 3.0,
        tau.powi(2) / 2.0,
        tau.powi(2) / 2.0,
        tau,
    )
}

/// Closed-form inverse of `Q(tau)`, from the inverse of `Qc`.
pub fn calc_q_inv(qc_inv: &DMatrix<f64>, tau: f64) -> DMatrix<f64> {
    block_2x2(
        qc_inv,
        12.0 / tau.powi(3),
        -6.0 / tau.powi(2),
        -6.0 / tau.powi(2),
        4.0 / tau,
    )
}

fn block_2x2(m: &DMatrix<f64>, a: f64, b: f64, c: f64, d: f64) -> DMatrix<f64> {
    let dof = m.nrows();
    let mut out = DMatrix::zeros(2 * dof, 2 * dof);
    out.view_mut((0, 0), (dof, dof)).copy_from(&(m * a));
    out.view_mut((0, dof), (dof, dof)).copy_from(&(m * b));
    out.view_mut((dof, 0), (dof, dof)).copy_from(&(m * c));
    out.view_mut((dof, dof), (dof, dof)).copy_from(&(m * d));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q_inverse_closed_form() {
        let qc = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
        let qc_inv = qc_inverse(&qc).unwrap();
        for tau in [0.05, 0.5, 2.0] {
            let product = calc_q(&qc, tau) * calc_q_inv(&qc_inv, tau);
            assert!((product - DMatrix::identity(4, 4)).amax() < 1e-9);
        }
    }

    #[test]
    fn test_phi_composition() {
        let phi = calc_phi(3, 0.4) * calc_phi(3, 0.6);
        assert!((phi - calc_phi(3, 1.0)).amax() < 1e-12);
    }

    #[test]
    fn test_invalid_qc() {
        assert!(qc_inverse(&DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0])).is_err());
        assert!(qc_inverse(&DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0])).is_err());
        assert!(qc_inverse(&DMatrix::zeros(2, 3)).is_err());
    }
}
