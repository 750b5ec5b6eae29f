use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use faer::Mat;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::{ProblemError, ProblemResult, ResidualBlock, VariableId, VariableLayout, Values};
use crate::factors::{Factor, FactorKind};
use crate::linalg::SparseMatrix;

/// Sum of squares problem over vector-valued variables.
///
/// Residual blocks are kept in insertion order; their rows in the stacked
/// residual follow that order. Fixed variables keep their value and get no
/// Jacobian columns.
#[derive(Clone, Default)]
pub struct Problem {
    pub total_residual_dimension: usize,
    residual_id_count: usize,
    residual_blocks: BTreeMap<usize, ResidualBlock>,
    fixed_variables: BTreeSet<VariableId>,
}

type BlockLinearization = (DVector<f64>, Option<DMatrix<f64>>);

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_residual_block(&mut self, variable_keys: &[VariableId], factor: Arc<dyn Factor>) -> usize {
        let block_id = self.residual_id_count;
        self.total_residual_dimension += factor.get_dimension();
        self.residual_blocks
            .insert(block_id, ResidualBlock::new(block_id, variable_keys, factor));
        self.residual_id_count += 1;
        block_id
    }

    pub fn remove_residual_block(&mut self, block_id: usize) -> Option<ResidualBlock> {
        let block = self.residual_blocks.remove(&block_id)?;
        self.total_residual_dimension -= block.dim_residual();
        Some(block)
    }

    pub fn residual_block(&self, block_id: usize) -> Option<&ResidualBlock> {
        self.residual_blocks.get(&block_id)
    }

    pub fn residual_blocks(&self) -> impl Iterator<Item = &ResidualBlock> {
        self.residual_blocks.values()
    }

    pub fn num_residual_blocks(&self) -> usize {
        self.residual_blocks.len()
    }

    pub fn fix_variable(&mut self, key: VariableId) {
        self.fixed_variables.insert(key);
    }

    pub fn unfix_variable(&mut self, key: VariableId) {
        self.fixed_variables.remove(&key);
    }

    pub fn is_fixed(&self, key: VariableId) -> bool {
        self.fixed_variables.contains(&key)
    }

    /// Columns of every free variable referenced by a residual block.
    pub fn variable_layout(&self, values: &Values) -> ProblemResult<VariableLayout> {
        let mut dims = BTreeMap::new();
        for block in self.residual_blocks.values() {
            for &key in &block.variable_keys {
                if self.is_fixed(key) {
                    continue;
                }
                let value = values.get(key).ok_or(ProblemError::MissingVariable(key))?;
                dims.insert(key, value.len());
            }
        }
        Ok(VariableLayout::from_dimensions(dims))
    }

    fn linearize_blocks(
        &self,
        values: &Values,
        compute_jacobian: bool,
    ) -> ProblemResult<Vec<(&ResidualBlock, BlockLinearization)>> {
        let blocks: Vec<&ResidualBlock> = self.residual_blocks.values().collect();
        blocks
            .par_iter()
            .map(|block| Ok((*block, block.residual_and_jacobian(values, compute_jacobian)?)))
            .collect()
    }

    /// Stacked whitened residual vector
    pub fn compute_residual(&self, values: &Values) -> ProblemResult<Mat<f64>> {
        let linearized = self.linearize_blocks(values, false)?;
        let mut residual = Mat::zeros(self.total_residual_dimension, 1);
        let mut row = 0;
        for (_, (block_residual, _)) in &linearized {
            for i in 0..block_residual.len() {
                residual[(row + i, 0)] = block_residual[i];
            }
            row += block_residual.len();
        }
        Ok(residual)
    }

    /// Stacked residual and sparse Jacobian with respect to the variables of `layout`.
    ///
    /// Blocks are linearized in parallel; only non-zero Jacobian entries are stored.
    pub fn compute_residual_and_jacobian(
        &self,
        values: &Values,
        layout: &VariableLayout,
    ) -> ProblemResult<(Mat<f64>, SparseMatrix)> {
        let linearized = self.linearize_blocks(values, true)?;
        let mut residual = Mat::zeros(self.total_residual_dimension, 1);
        let mut triplets = Vec::new();
        let mut row = 0;

        for (block, (block_residual, block_jacobian)) in &linearized {
            let dim = block_residual.len();
            for i in 0..dim {
                residual[(row + i, 0)] = block_residual[i];
            }
            if let Some(jacobian) = block_jacobian {
                let mut local_col = 0;
                for &key in &block.variable_keys {
                    let width = values.get(key).map_or(0, |v| v.len());
                    if let Some((start, _)) = layout.columns_of(key) {
                        for c in 0..width {
                            for r in 0..dim {
                                let value = jacobian[(r, local_col + c)];
                                if value != 0.0 {
                                    triplets.push(Triplet::new(row + r, start + c, value));
                                }
                            }
                        }
                    }
                    local_col += width;
                }
            }
            row += dim;
        }

        let jacobian = SparseColMat::try_new_from_triplets(
            self.total_residual_dimension,
            layout.total_dimension(),
            &triplets,
        )
        .map_err(|e| ProblemError::SparseAssembly(format!("{e:?}")))?;
        Ok((residual, jacobian))
    }

    /// `0.5 * ||r||^2`
    pub fn compute_cost(&self, values: &Values) -> ProblemResult<f64> {
        let residual = self.compute_residual(values)?;
        Ok(0.5 * residual.norm_l2().powi(2))
    }

    /// `0.5 * ||r||^2` split by factor role
    pub fn cost_by_kind(&self, values: &Values) -> ProblemResult<BTreeMap<FactorKind, f64>> {
        let mut costs = BTreeMap::new();
        for (block, (residual, _)) in self.linearize_blocks(values, false)? {
            *costs.entry(block.factor.kind()).or_insert(0.0) += 0.5 * residual.norm_squared();
        }
        Ok(costs)
    }
}

impl std::fmt::Debug for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("total_residual_dimension", &self.total_residual_dimension)
            .field("num_residual_blocks", &self.residual_blocks.len())
            .field("fixed_variables", &self.fixed_variables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::factors::{GaussianNoise, GaussianProcessPriorFactor, PriorFactor};

    fn vec2(a: f64, b: f64) -> DVector<f64> {
        DVector::from_vec(vec![a, b])
    }

    /// Two states linked by a GP prior, first state pinned by priors.
    fn two_state_problem() -> (Problem, Values) {
        let mut problem = Problem::new();
        let noise = GaussianNoise::isotropic(2, 0.1).unwrap();
        problem.add_residual_block(
            &[VariableId(0)],
            Arc::new(PriorFactor::new(vec2(0.0, 0.0), noise.clone()).unwrap()),
        );
        problem.add_residual_block(
            &[VariableId(1)],
            Arc::new(PriorFactor::new(vec2(1.0, 0.0), noise).unwrap()),
        );
        let gp = GaussianProcessPriorFactor::new(&DMatrix::identity(2, 2), 1.0).unwrap();
        problem.add_residual_block(
            &[VariableId(0), VariableId(1), VariableId(2), VariableId(3)],
            Arc::new(gp),
        );

        let values: Values = (0..4).map(|i| (VariableId(i), vec2(0.1 * i as f64, 0.0))).collect();
        (problem, values)
    }

    #[test]
    fn test_dimensions_and_removal() {
        let (mut problem, _) = two_state_problem();
        assert_eq!(problem.num_residual_blocks(), 3);
        assert_eq!(problem.total_residual_dimension, 8);
        let removed = problem.remove_residual_block(1).unwrap();
        assert_eq!(removed.variable_keys, vec![VariableId(1)]);
        assert_eq!(problem.total_residual_dimension, 6);
        assert!(problem.remove_residual_block(1).is_none());
    }

    #[test]
    fn test_layout_skips_fixed_variables() {
        let (mut problem, values) = two_state_problem();
        assert_eq!(problem.variable_layout(&values).unwrap().total_dimension(), 8);
        problem.fix_variable(VariableId(0));
        let layout = problem.variable_layout(&values).unwrap();
        assert_eq!(layout.total_dimension(), 6);
        assert_eq!(layout.columns_of(VariableId(0)), None);
        assert_eq!(layout.columns_of(VariableId(1)), Some((0, 2)));
        problem.unfix_variable(VariableId(0));
        assert!(!problem.is_fixed(VariableId(0)));
    }

    #[test]
    fn test_sparse_jacobian_matches_dense_blocks() {
        let (problem, values) = two_state_problem();
        let layout = problem.variable_layout(&values).unwrap();
        let (residual, jacobian) = problem.compute_residual_and_jacobian(&values, &layout).unwrap();
        assert_eq!(residual.nrows(), 8);
        assert_eq!(jacobian.nrows(), 8);
        assert_eq!(jacobian.ncols(), 8);

        let dense = jacobian.to_dense();
        // prior on x0 occupies rows 0..2, columns 0..2 with 1 / sigma
        assert!((dense[(0, 0)] - 10.0).abs() < 1e-12);
        assert_eq!(dense[(0, 2)], 0.0);
        // GP prior rows start at 4 and touch every column
        let touched = (0..8).filter(|&c| (4..8).any(|r| dense[(r, c)] != 0.0)).count();
        assert_eq!(touched, 8);
    }

    #[test]
    fn test_cost_by_kind_sums_to_total() {
        let (problem, values) = two_state_problem();
        let total = problem.compute_cost(&values).unwrap();
        let by_kind = problem.cost_by_kind(&values).unwrap();
        let sum: f64 = by_kind.values().sum();
        assert!((total - sum).abs() < 1e-9);
        assert!(by_kind.contains_key(&FactorKind::Prior));
        assert!(by_kind.contains_key(&FactorKind::GaussianProcessPrior));
    }

    #[test]
    fn test_missing_variable() {
        let (problem, mut values) = two_state_problem();
        values.remove(VariableId(3));
        assert!(matches!(
            problem.compute_cost(&values),
            Err(ProblemError::MissingVariable(VariableId(3)))
        ));
    }
}
