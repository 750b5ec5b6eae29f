//! Plain-text persistence for distance fields and trajectories.
//!
//! Both formats are whitespace separated, one record per line, with `#`
//! comments and blank lines ignored:
//! - [`SdfLoader`]: a header line followed by grid rows
//! - [`load_trajectory`] / [`write_trajectory`]: one `t q... v...` line per state
//!
//! Files are read through a memory map and rows are parsed in parallel.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;
use tracing::error;

use crate::obstacle::SdfError;

pub mod sdf;
pub mod trajectory;

pub use sdf::SdfLoader;
pub use trajectory::{load_trajectory, write_trajectory};

/// Errors that can occur while reading or writing planner files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid number format at line {line}: {value}")]
    InvalidNumber { line: usize, value: String },

    #[error("Wrong number of fields at line {line}: expected {expected}, got {actual}")]
    FieldCount {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid distance field: {0}")]
    Field(#[from] SdfError),

    #[error("Invalid trajectory: {0}")]
    Trajectory(String),
}

impl IoError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for file operations
pub type IoResult<T> = Result<T, IoError>;

/// Non-empty, non-comment line with its 1-based line number.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Record<'a> {
    pub line: usize,
    pub text: &'a str,
}

/// Memory-map `path` and hand its text to `parse`.
pub(crate) fn with_mapped_text<P, T>(path: P, parse: impl FnOnce(&str) -> IoResult<T>) -> IoResult<T>
where
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let content = std::str::from_utf8(&mmap).map_err(|e| IoError::Parse {
        line: 0,
        message: format!("Invalid UTF-8: {e}"),
    })?;
    parse(content)
}

pub(crate) fn records(content: &str) -> Vec<Record<'_>> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                None
            } else {
                Some(Record { line: i + 1, text })
            }
        })
        .collect()
}

pub(crate) fn parse_f64(token: &str, line: usize) -> IoResult<f64> {
    token.parse::<f64>().map_err(|_| IoError::InvalidNumber {
        line,
        value: token.to_string(),
    })
}

pub(crate) fn parse_usize(token: &str, line: usize) -> IoResult<usize> {
    token.parse::<usize>().map_err(|_| IoError::InvalidNumber {
        line,
        value: token.to_string(),
    })
}

/// Parse every token of a record as `f64`, requiring exactly `expected` of them.
pub(crate) fn parse_row(record: &Record<'_>, expected: usize) -> IoResult<Vec<f64>> {
    let values = record
        .text
        .split_whitespace()
        .map(|t| parse_f64(t, record.line))
        .collect::<IoResult<Vec<_>>>()?;
    if values.len() != expected {
        return Err(IoError::FieldCount {
            line: record.line,
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}
