use nalgebra::{DMatrix, Vector2, Vector3};

use super::{AxisSample, DistanceField, SdfError, SdfResult};

/// Planar signed distance field.
///
/// `data[(row, col)]` is the distance at `origin + cell_size * (col, row)`.
#[derive(Debug, Clone)]
pub struct PlanarSdf {
    origin: Vector2<f64>,
    cell_size: f64,
    data: DMatrix<f64>,
}

impl PlanarSdf {
    /// # Errors
    /// `InvalidGrid` for an empty matrix or a non-positive cell size.
    pub fn new(origin: Vector2<f64>, cell_size: f64, data: DMatrix<f64>) -> SdfResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SdfError::InvalidGrid(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(SdfError::InvalidGrid("field data is empty".to_string()));
        }
        Ok(Self {
            origin,
            cell_size,
            data,
        })
    }

    pub fn origin(&self) -> &Vector2<f64> {
        &self.origin
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Continuous (col, row) grid coordinates of a point
    fn grid_coords(&self, point: &Vector2<f64>) -> (f64, f64) {
        let rel = (point - self.origin) / self.cell_size;
        (rel.x, rel.y)
    }

    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        let (col, row) = self.grid_coords(point);
        AxisSample::contains(col, self.cols()) && AxisSample::contains(row, self.rows())
    }

    /// Bilinear interpolation, clamped to the grid.
    pub fn signed_distance(&self, point: &Vector2<f64>) -> f64 {
        self.signed_distance_with_gradient(point).0
    }

    /// # Errors
    /// `QueryOutOfRange` when the point lies outside the grid.
    pub fn try_signed_distance(&self, point: &Vector2<f64>) -> SdfResult<f64> {
        if !self.contains(point) {
            return Err(SdfError::QueryOutOfRange {
                x: point.x,
                y: point.y,
                z: 0.0,
            });
        }
        Ok(self.signed_distance(point))
    }

    /// Interpolated distance and its gradient with respect to the query point.
    pub fn signed_distance_with_gradient(&self, point: &Vector2<f64>) -> (f64, Vector2<f64>) {
        let (col, row) = self.grid_coords(point);
        let cx = AxisSample::locate(col, self.cols());
        let ry = AxisSample::locate(row, self.rows());

        let d00 = self.data[(ry.lo, cx.lo)];
        let d01 = self.data[(ry.lo, cx.hi)];
        let d10 = self.data[(ry.hi, cx.lo)];
        let d11 = self.data[(ry.hi, cx.hi)];

        let (tx, ty) = (cx.t, ry.t);
        let value = (1.0 - ty) * ((1.0 - tx) * d00 + tx * d01) + ty * ((1.0 - tx) * d10 + tx * d11);

        let mut gradient = Vector2::zeros();
        if !cx.clamped {
            gradient.x = ((1.0 - ty) * (d01 - d00) + ty * (d11 - d10)) / self.cell_size;
        }
        if !ry.clamped {
            gradient.y = ((1.0 - tx) * (d10 - d00) + tx * (d11 - d01)) / self.cell_size;
        }
        (value, gradient)
    }
}

impl DistanceField for PlanarSdf {
    fn distance_and_gradient(&self, point: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let (value, g) = self.signed_distance_with_gradient(&point.xy());
        (value, Vector3::new(g.x, g.y, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_field() -> PlanarSdf {
        // value = 2 * col + 3 * row
        let data = DMatrix::from_fn(4, 5, |r, c| 2.0 * c as f64 + 3.0 * r as f64);
        PlanarSdf::new(Vector2::new(-1.0, 1.0), 0.5, data).unwrap()
    }

    #[test]
    fn test_exact_at_grid_points() {
        let field = ramp_field();
        for r in 0..4 {
            for c in 0..5 {
                let p = Vector2::new(-1.0 + 0.5 * c as f64, 1.0 + 0.5 * r as f64);
                assert!((field.signed_distance(&p) - field.data()[(r, c)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_midpoint_is_mean() {
        let field = ramp_field();
        let p = Vector2::new(-1.0 + 0.25, 1.0);
        let expected = 0.5 * (field.data()[(0, 0)] + field.data()[(0, 1)]);
        assert!((field.signed_distance(&p) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_of_linear_field() {
        let field = ramp_field();
        let (_, g) = field.signed_distance_with_gradient(&Vector2::new(-0.3, 1.7));
        assert!((g.x - 4.0).abs() < 1e-9);
        assert!((g.y - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let field = ramp_field();
        let inside = field.signed_distance(&Vector2::new(-1.0, 1.5));
        let (outside, g) = field.signed_distance_with_gradient(&Vector2::new(-5.0, 1.5));
        assert!((inside - outside).abs() < 1e-12);
        assert_eq!(g.x, 0.0);
        assert!((g.y - 6.0).abs() < 1e-9);

        assert!(!field.contains(&Vector2::new(-5.0, 1.5)));
        assert!(matches!(
            field.try_signed_distance(&Vector2::new(-5.0, 1.5)),
            Err(SdfError::QueryOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_cell_size() {
        let result = PlanarSdf::new(Vector2::zeros(), 0.0, DMatrix::zeros(2, 2));
        assert!(matches!(result, Err(SdfError::InvalidGrid(_))));
    }
}
