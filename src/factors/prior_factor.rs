use nalgebra::{DMatrix, DVector};

use super::{Factor, FactorError, FactorKind, FactorResult, GaussianNoise, check_params};

/// Soft prior pulling one vector variable toward a target value.
///
/// Residual: `R (x - target)`
#[derive(Debug, Clone)]
pub struct PriorFactor {
    target: DVector<f64>,
    noise: GaussianNoise,
}

impl PriorFactor {
    pub fn new(target: DVector<f64>, noise: GaussianNoise) -> FactorResult<Self> {
        if noise.dim() != target.len() {
            return Err(FactorError::InvalidDimension {
                expected: target.len(),
                actual: noise.dim(),
            });
        }
        Ok(Self { target, noise })
    }

    pub fn target(&self) -> &DVector<f64> {
        &self.target
    }
}

impl Factor for PriorFactor {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        check_params(params, &[self.target.len()])?;
        let residual = self.noise.whiten(&(&params[0] - &self.target));
        let jacobian = compute_jacobian.then(|| self.noise.sqrt_information().clone());
        Ok((residual, jacobian))
    }

    fn get_dimension(&self) -> usize {
        self.target.len()
    }

    fn kind(&self) -> FactorKind {
        FactorKind::Prior
    }
}
