use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
};

use super::{LinAlgError, LinAlgResult, SparseLinearSolver, SparseMatrix, normal_equations};

/// Sparse Cholesky solver for the normal equations.
///
/// The symbolic factorization is redone on every solve: the set of active
/// obstacle residuals changes between iterations, and with it the sparsity
/// pattern of the Hessian.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    last_dimension: Option<usize>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension of the last system solved
    pub fn last_dimension(&self) -> Option<usize> {
        self.last_dimension
    }

    fn solve_system(&mut self, hessian: &SparseMatrix, rhs: &Mat<f64>) -> LinAlgResult<Mat<f64>> {
        let sym = SymbolicLlt::try_new(hessian.symbolic(), Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed(format!("Symbolic Cholesky failed: {:?}", e))
        })?;

        let cholesky = Llt::try_new_with_symbolic(sym, hessian.as_ref(), Side::Lower).map_err(|e| {
            LinAlgError::SingularMatrix(format!("Hessian not positive definite: {:?}", e))
        })?;
        self.last_dimension = Some(hessian.ncols());
        Ok(cholesky.solve(rhs))
    }
}

impl SparseLinearSolver for SparseCholeskySolver {
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, rhs) = normal_equations(residuals, jacobians, 0.0)?;
        self.solve_system(&hessian, &rhs)
    }

    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, rhs) = normal_equations(residuals, jacobians, lambda)?;
        self.solve_system(&hessian, &rhs)
    }
}
