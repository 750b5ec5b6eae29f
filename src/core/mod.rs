//! Core optimization components for the gpmp-solver library
//!
//! This module contains the fundamental building blocks for nonlinear least squares optimization:
//! - Problem formulation and management
//! - Residual blocks binding factors to variables
//! - Variable keys, values and Jacobian column layout

use thiserror::Error;
use tracing::error;

use crate::factors::FactorError;

pub mod problem;
pub mod residual_block;
pub mod variable;

pub use problem::Problem;
pub use residual_block::ResidualBlock;
pub use variable::{Values, VariableId, VariableLayout};

/// Problem evaluation errors
#[derive(Debug, Clone, Error)]
pub enum ProblemError {
    /// A residual block references a variable with no value
    #[error("Variable {0} has no value")]
    MissingVariable(VariableId),

    /// A factor failed to linearize
    #[error("Factor evaluation failed: {0}")]
    Factor(#[from] FactorError),

    /// The sparse Jacobian could not be assembled
    #[error("Sparse Jacobian assembly failed: {0}")]
    SparseAssembly(String),
}

impl ProblemError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for problem evaluation
pub type ProblemResult<T> = Result<T, ProblemError>;
