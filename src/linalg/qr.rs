use faer::{
    Mat,
    linalg::solvers::SolveLstsqCore,
    sparse::linalg::solvers::{Qr, SymbolicQr},
};

use super::{LinAlgError, LinAlgResult, SparseLinearSolver, SparseMatrix, normal_equations};

/// Sparse QR solver for the normal equations.
///
/// Factorizes the (damped) Hessian with QR instead of Cholesky, which keeps
/// working when the Hessian is only semi-definite up to round-off.
#[derive(Debug, Clone, Default)]
pub struct SparseQRSolver;

impl SparseQRSolver {
    pub fn new() -> Self {
        Self
    }

    fn solve_system(&self, hessian: &SparseMatrix, rhs: Mat<f64>) -> LinAlgResult<Mat<f64>> {
        let sym = SymbolicQr::try_new(hessian.symbolic()).map_err(|e| {
            LinAlgError::FactorizationFailed(format!("Symbolic QR failed: {:?}", e))
        })?;
        let qr = Qr::try_new_with_symbolic(sym, hessian.as_ref())
            .map_err(|e| LinAlgError::FactorizationFailed(format!("Numeric QR failed: {:?}", e)))?;

        let mut solution = rhs;
        qr.solve_lstsq_in_place_with_conj(faer::Conj::No, solution.as_mut());
        if (0..solution.nrows()).any(|i| !solution[(i, 0)].is_finite()) {
            return Err(LinAlgError::SingularMatrix(
                "QR solution contains non-finite values".to_string(),
            ));
        }
        Ok(solution)
    }
}

impl SparseLinearSolver for SparseQRSolver {
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, rhs) = normal_equations(residuals, jacobians, 0.0)?;
        self.solve_system(&hessian, rhs)
    }

    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobians: &SparseMatrix,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>> {
        let (hessian, rhs) = normal_equations(residuals, jacobians, lambda)?;
        self.solve_system(&hessian, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::SparseCholeskySolver;
    use faer::sparse::{SparseColMat, Triplet};

    #[test]
    fn test_qr_matches_cholesky() {
        let triplets = vec![
            Triplet::new(0, 0, 1.0),
            Triplet::new(1, 1, 2.0),
            Triplet::new(2, 0, 1.0),
            Triplet::new(2, 1, 1.0),
            Triplet::new(3, 2, 0.5),
            Triplet::new(4, 1, -1.0),
            Triplet::new(4, 2, 3.0),
        ];
        let j = SparseColMat::try_new_from_triplets(5, 3, &triplets).unwrap();
        let r = Mat::from_fn(5, 1, |i, _| 0.3 * i as f64 - 0.5);

        let qr = SparseQRSolver::new()
            .solve_augmented_equation(&r, &j, 1e-3)
            .unwrap();
        let chol = SparseCholeskySolver::new()
            .solve_augmented_equation(&r, &j, 1e-3)
            .unwrap();
        for i in 0..3 {
            assert!((qr[(i, 0)] - chol[(i, 0)]).abs() < 1e-9);
        }
    }
}
