use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{ProblemError, ProblemResult, VariableId, Values};
use crate::factors::Factor;

/// A factor bound to the variables it reads.
#[derive(Clone)]
pub struct ResidualBlock {
    pub residual_block_id: usize,
    pub variable_keys: Vec<VariableId>,
    pub factor: Arc<dyn Factor>,
}

impl ResidualBlock {
    pub fn new(residual_block_id: usize, variable_keys: &[VariableId], factor: Arc<dyn Factor>) -> Self {
        Self {
            residual_block_id,
            variable_keys: variable_keys.to_vec(),
            factor,
        }
    }

    pub fn dim_residual(&self) -> usize {
        self.factor.get_dimension()
    }

    /// Gather the block's variables from `values`, in key-list order.
    pub fn gather(&self, values: &Values) -> ProblemResult<Vec<DVector<f64>>> {
        self.variable_keys
            .iter()
            .map(|&key| {
                values
                    .get(key)
                    .cloned()
                    .ok_or(ProblemError::MissingVariable(key))
            })
            .collect()
    }

    pub fn residual_and_jacobian(
        &self,
        values: &Values,
        compute_jacobian: bool,
    ) -> ProblemResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        let params = self.gather(values)?;
        Ok(self.factor.linearize(&params, compute_jacobian)?)
    }
}

impl std::fmt::Debug for ResidualBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidualBlock")
            .field("residual_block_id", &self.residual_block_id)
            .field("variable_keys", &self.variable_keys)
            .field("kind", &self.factor.kind())
            .field("dim_residual", &self.dim_residual())
            .finish()
    }
}
