//! Sparse linear algebra for the Gauss-Newton family of solvers.
//!
//! Every iteration of the nonlinear solvers reduces to the (optionally damped)
//! normal equations `(J^T J + lambda I) dx = -J^T r`, where `J` is the sparse
//! whitened Jacobian assembled by [`crate::core::Problem`]. This module provides:
//! - [`SparseCholeskySolver`]: sparse LL^T factorization (default)
//! - [`SparseQRSolver`]: sparse QR, slower but tolerant of rank deficiency
//! - helpers shared by the optimizers (gradient, Jacobian-vector products)

use std::ops::Mul;

use faer::Mat;
use faer::sparse::{SparseColMat, Triplet};
use thiserror::Error;
use tracing::error;

pub mod cholesky;
pub mod qr;

pub use cholesky::SparseCholeskySolver;
pub use qr::SparseQRSolver;

/// Type alias for sparse matrices using faer
pub type SparseMatrix = SparseColMat<usize, f64>;

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Inconsistent matrix/vector sizes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Symbolic or numeric factorization failed
    #[error("Factorization failed: {0}")]
    FactorizationFailed(String),

    /// The system matrix is not positive definite / is singular
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// Transpose or format conversion failed
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),

    /// Triplet assembly failed
    #[error("Sparse matrix creation failed: {0}")]
    SparseMatrixCreation(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Linear solver used inside the nonlinear iterations
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    SparseCholesky,
    SparseQR,
}

/// Solver for the normal equations of a sparse least-squares linearization.
pub trait SparseLinearSolver: Send {
    /// Solve `J^T J dx = -J^T r`
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
    ) -> LinAlgResult<Mat<f64>>;

    /// Solve `(J^T J + lambda I) dx = -J^T r`
    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>>;
}

/// Create a boxed linear solver of the requested type
pub fn create_linear_solver(solver_type: LinearSolverType) -> Box<dyn SparseLinearSolver> {
    match solver_type {
        LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
        LinearSolverType::SparseQR => Box::new(SparseQRSolver::new()),
    }
}

/// Build `H = J^T J + lambda I` and the right-hand side `-J^T r`.
pub(crate) fn normal_equations(
    residuals: &Mat<f64>,
    jacobians: &SparseMatrix,
    lambda: f64,
) -> LinAlgResult<(SparseMatrix, Mat<f64>)> {
    if residuals.nrows() != jacobians.nrows() {
        return Err(LinAlgError::InvalidInput(format!(
            "residual has {} rows, Jacobian has {}",
            residuals.nrows(),
            jacobians.nrows()
        )));
    }
    let jt = jacobians
        .as_ref()
        .transpose()
        .to_col_major()
        .map_err(|e| LinAlgError::MatrixConversion(format!("Transpose failed: {:?}", e)))?;
    let hessian = jt.as_ref().mul(jacobians.as_ref());
    let gradient = jacobians.as_ref().transpose().mul(residuals);

    let mut neg_gradient = Mat::zeros(gradient.nrows(), 1);
    for i in 0..gradient.nrows() {
        neg_gradient[(i, 0)] = -gradient[(i, 0)];
    }

    let hessian = if lambda > 0.0 {
        add_diagonal(&hessian, lambda)?
    } else {
        hessian
    };
    Ok((hessian, neg_gradient))
}

/// `H + lambda I`, adding missing diagonal entries where needed.
pub(crate) fn add_diagonal(hessian: &SparseMatrix, lambda: f64) -> LinAlgResult<SparseMatrix> {
    let n = hessian.ncols();
    let symbolic = hessian.symbolic();
    let mut triplets = Vec::new();
    let mut has_diagonal = vec![false; n];

    for col in 0..n {
        let rows = symbolic.row_idx_of_col_raw(col);
        let values = hessian.val_of_col(col);
        for (idx, &row) in rows.iter().enumerate() {
            let mut value = values[idx];
            if row == col {
                value += lambda;
                has_diagonal[col] = true;
            }
            triplets.push(Triplet::new(row, col, value));
        }
    }
    for (i, present) in has_diagonal.iter().enumerate() {
        if !present {
            triplets.push(Triplet::new(i, i, lambda));
        }
    }

    SparseColMat::try_new_from_triplets(hessian.nrows(), n, &triplets)
        .map_err(|e| LinAlgError::SparseMatrixCreation(format!("H + lambda I: {:?}", e)))
}

/// Gradient of `0.5 ||r||^2`, i.e. `J^T r`
pub fn compute_gradient(residuals: &Mat<f64>, jacobians: &SparseMatrix) -> Mat<f64> {
    jacobians.as_ref().transpose().mul(residuals)
}

/// Sparse matrix times dense column vector, `J v`
pub fn sparse_mul_vec(matrix: &SparseMatrix, v: &Mat<f64>) -> Mat<f64> {
    let mut out = Mat::zeros(matrix.nrows(), 1);
    let symbolic = matrix.symbolic();
    for col in 0..matrix.ncols() {
        let x = v[(col, 0)];
        if x == 0.0 {
            continue;
        }
        let rows = symbolic.row_idx_of_col_raw(col);
        let values = matrix.val_of_col(col);
        for (idx, &row) in rows.iter().enumerate() {
            out[(row, 0)] += values[idx] * x;
        }
    }
    out
}

/// Dot product of two column vectors
pub fn dot(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    (0..a.nrows()).map(|i| a[(i, 0)] * b[(i, 0)]).sum()
}
