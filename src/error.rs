//! Error types for the gpmp-solver library
//!
//! This module provides the main error and result types used throughout the library.
//! Every module owns a narrow `thiserror` enum; all of them convert into [`PlannerError`]
//! so planner-level code can propagate with `?`.

use crate::{
    core::ProblemError, factors::FactorError, gp::GpError, io::IoError,
    kinematics::KinematicsError, linalg::LinAlgError, obstacle::SdfError,
    optimizer::OptimizerError,
};
use std::{
    io::Error,
    num::{ParseFloatError, ParseIntError},
};
use thiserror::Error;

/// Main result type used throughout the gpmp-solver library
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Main error type for the gpmp-solver library
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    /// Forward kinematics and body-sphere errors
    #[error("Kinematics error: {0}")]
    Kinematics(String),

    /// Distance field construction and query errors
    #[error("Distance field error: {0}")]
    DistanceField(String),

    /// Gaussian-process model errors
    #[error("Gaussian process error: {0}")]
    GaussianProcess(String),

    /// Factor construction or evaluation errors
    #[error("Factor error: {0}")]
    Factor(String),

    /// Linear algebra related errors
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Solver related errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// IO related errors (file loading, parsing, etc.)
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An incremental session operation was called in the wrong state
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
}

// Conversions from standard library errors

impl From<Error> for PlannerError {
    fn from(err: Error) -> Self {
        PlannerError::Io(err.to_string())
    }
}

impl From<ParseFloatError> for PlannerError {
    fn from(err: ParseFloatError) -> Self {
        PlannerError::InvalidInput(format!("Failed to parse float: {err}"))
    }
}

impl From<ParseIntError> for PlannerError {
    fn from(err: ParseIntError) -> Self {
        PlannerError::InvalidInput(format!("Failed to parse integer: {err}"))
    }
}

// Convert module-specific errors to PlannerError

impl From<KinematicsError> for PlannerError {
    fn from(err: KinematicsError) -> Self {
        PlannerError::Kinematics(err.to_string())
    }
}

impl From<SdfError> for PlannerError {
    fn from(err: SdfError) -> Self {
        PlannerError::DistanceField(err.to_string())
    }
}

impl From<GpError> for PlannerError {
    fn from(err: GpError) -> Self {
        PlannerError::GaussianProcess(err.to_string())
    }
}

impl From<FactorError> for PlannerError {
    fn from(err: FactorError) -> Self {
        PlannerError::Factor(err.to_string())
    }
}

impl From<ProblemError> for PlannerError {
    fn from(err: ProblemError) -> Self {
        match err {
            ProblemError::Factor(e) => e.into(),
            other => PlannerError::Solver(other.to_string()),
        }
    }
}

impl From<LinAlgError> for PlannerError {
    fn from(err: LinAlgError) -> Self {
        PlannerError::LinearAlgebra(err.to_string())
    }
}

impl From<OptimizerError> for PlannerError {
    fn from(err: OptimizerError) -> Self {
        PlannerError::Solver(err.to_string())
    }
}

impl From<IoError> for PlannerError {
    fn from(err: IoError) -> Self {
        PlannerError::Io(err.to_string())
    }
}
