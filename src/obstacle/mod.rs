//! Signed distance fields and the hinge obstacle cost.
//!
//! Fields are regular grids queried with linear interpolation:
//! - [`SignedDistanceField`]: 3D grid stored as z-slices of rows x cols matrices
//! - [`PlanarSdf`]: 2D grid stored as one rows x cols matrix
//!
//! In both, the x coordinate maps to the column index, y to the row index and
//! z to the slice index. Queries outside the grid are clamped onto its bounding
//! box; the gradient along a clamped axis is zero.

use nalgebra::Vector3;
use thiserror::Error;
use tracing::error;

pub mod obstacle_cost;
pub mod planar_sdf;
pub mod signed_distance_field;

pub use obstacle_cost::hinge_loss_obstacle_cost;
pub use planar_sdf::PlanarSdf;
pub use signed_distance_field::SignedDistanceField;

/// Distance-field specific error types
#[derive(Debug, Clone, Error)]
pub enum SdfError {
    /// Grid geometry is unusable (zero cells, non-positive cell size, ...)
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// A slice or matrix does not have the grid's shape
    #[error("Field data shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// Slice index past the number of z-slices
    #[error("Slice index {index} out of range ({count} slices)")]
    SliceOutOfRange { index: usize, count: usize },

    /// Strict query outside the grid
    #[error("Query point ({x:.4}, {y:.4}, {z:.4}) is outside the field")]
    QueryOutOfRange { x: f64, y: f64, z: f64 },
}

impl SdfError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for distance field operations
pub type SdfResult<T> = Result<T, SdfError>;

/// Uniform distance query used by the obstacle factors.
///
/// Planar fields ignore the z coordinate and report a zero z-gradient, so the
/// same factor code serves planar and spatial workspaces.
pub trait DistanceField: Send + Sync + std::fmt::Debug {
    /// Signed distance at `point` and its gradient with respect to `point`
    fn distance_and_gradient(&self, point: &Vector3<f64>) -> (f64, Vector3<f64>);

    fn distance(&self, point: &Vector3<f64>) -> f64 {
        self.distance_and_gradient(point).0
    }
}

/// Interpolation sample along one grid axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AxisSample {
    pub lo: usize,
    pub hi: usize,
    /// Weight of `hi`, in [0, 1]
    pub t: f64,
    /// The query fell outside the axis and was projected onto it
    pub clamped: bool,
}

impl AxisSample {
    /// Locate continuous grid coordinate `coord` on an axis with `n` samples.
    pub(crate) fn locate(coord: f64, n: usize) -> Self {
        let upper = (n - 1) as f64;
        let clamped = coord.is_nan() || coord < 0.0 || coord > upper;
        let coord = if coord.is_nan() { 0.0 } else { coord.clamp(0.0, upper) };
        if n == 1 {
            return Self {
                lo: 0,
                hi: 0,
                t: 0.0,
                clamped: true,
            };
        }
        let lo = (coord.floor() as usize).min(n - 2);
        Self {
            lo,
            hi: lo + 1,
            t: coord - lo as f64,
            clamped,
        }
    }

    /// Whether the grid coordinate lies within the axis
    pub(crate) fn contains(coord: f64, n: usize) -> bool {
        coord >= 0.0 && coord <= (n - 1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_inside() {
        let s = AxisSample::locate(2.25, 5);
        assert_eq!((s.lo, s.hi), (2, 3));
        assert!((s.t - 0.25).abs() < 1e-12);
        assert!(!s.clamped);
    }

    #[test]
    fn test_axis_last_sample() {
        let s = AxisSample::locate(4.0, 5);
        assert_eq!((s.lo, s.hi), (3, 4));
        assert!((s.t - 1.0).abs() < 1e-12);
        assert!(!s.clamped);
    }

    #[test]
    fn test_axis_clamped() {
        let below = AxisSample::locate(-3.0, 5);
        assert_eq!(below.lo, 0);
        assert_eq!(below.t, 0.0);
        assert!(below.clamped);

        let above = AxisSample::locate(10.0, 5);
        assert_eq!(above.hi, 4);
        assert_eq!(above.t, 1.0);
        assert!(above.clamped);

        let nan = AxisSample::locate(f64::NAN, 5);
        assert_eq!(nan.lo, 0);
        assert!(nan.clamped);
    }

    #[test]
    fn test_axis_single_sample() {
        let s = AxisSample::locate(0.7, 1);
        assert_eq!((s.lo, s.hi), (0, 0));
        assert!(s.clamped);
    }
}
