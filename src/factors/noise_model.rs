//! Gaussian noise models.
//!
//! A noise model is stored as its square-root information matrix `R` with
//! `R^T R = Sigma^-1`; whitening a residual `e` produces `R e`, whose squared
//! norm is the Mahalanobis distance.

use nalgebra::{DMatrix, DVector};

use super::{FactorError, FactorResult};

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianNoise {
    sqrt_information: DMatrix<f64>,
}

impl GaussianNoise {
    /// Unit covariance
    pub fn unit(dim: usize) -> Self {
        Self {
            sqrt_information: DMatrix::identity(dim, dim),
        }
    }

    /// Same standard deviation on every axis
    pub fn isotropic(dim: usize, sigma: f64) -> FactorResult<Self> {
        check_sigma(sigma)?;
        Ok(Self {
            sqrt_information: DMatrix::identity(dim, dim) / sigma,
        })
    }

    /// Independent standard deviation per axis
    pub fn diagonal(sigmas: &DVector<f64>) -> FactorResult<Self> {
        for &sigma in sigmas.iter() {
            check_sigma(sigma)?;
        }
        Ok(Self {
            sqrt_information: DMatrix::from_diagonal(&sigmas.map(|s| 1.0 / s)),
        })
    }

    /// Full information matrix `Sigma^-1`
    pub fn from_information(information: &DMatrix<f64>) -> FactorResult<Self> {
        if information.nrows() != information.ncols() {
            return Err(FactorError::InvalidNoiseModel(format!(
                "information matrix must be square, got {}x{}",
                information.nrows(),
                information.ncols()
            )));
        }
        let chol = information.clone().cholesky().ok_or_else(|| {
            FactorError::InvalidNoiseModel("information matrix is not positive definite".to_string())
        })?;
        // information = L L^T, so R = L^T
        Ok(Self {
            sqrt_information: chol.l().transpose(),
        })
    }

    /// Full covariance matrix `Sigma`
    pub fn from_covariance(covariance: &DMatrix<f64>) -> FactorResult<Self> {
        let information = covariance.clone().try_inverse().ok_or_else(|| {
            FactorError::InvalidNoiseModel("covariance matrix is singular".to_string())
        })?;
        Self::from_information(&information)
    }

    pub fn dim(&self) -> usize {
        self.sqrt_information.nrows()
    }

    pub fn sqrt_information(&self) -> &DMatrix<f64> {
        &self.sqrt_information
    }

    pub fn whiten(&self, error: &DVector<f64>) -> DVector<f64> {
        &self.sqrt_information * error
    }

    pub fn whiten_jacobian(&self, jacobian: &DMatrix<f64>) -> DMatrix<f64> {
        &self.sqrt_information * jacobian
    }

    /// Squared Mahalanobis norm of an unwhitened error
    pub fn mahalanobis_squared(&self, error: &DVector<f64>) -> f64 {
        self.whiten(error).norm_squared()
    }
}

fn check_sigma(sigma: f64) -> FactorResult<()> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(FactorError::InvalidNoiseModel(format!(
            "standard deviation must be positive, got {sigma}"
        )));
    }
    Ok(())
}
