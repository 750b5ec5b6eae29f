use nalgebra::{DMatrix, Vector3};

use super::{AxisSample, DistanceField, SdfError, SdfResult};

/// 3D signed distance field on a regular grid.
///
/// The field is stored as `z` slices, each a `rows x cols` matrix. Sample
/// `(row, col, k)` sits at `origin + cell_size * (col, row, k)`.
#[derive(Debug, Clone)]
pub struct SignedDistanceField {
    origin: Vector3<f64>,
    cell_size: f64,
    rows: usize,
    cols: usize,
    slices: Vec<DMatrix<f64>>,
}

impl SignedDistanceField {
    /// Create a zero-filled field; slices are supplied with [`Self::init_field_data`].
    ///
    /// # Errors
    /// `InvalidGrid` for zero dimensions or a non-positive cell size.
    pub fn new(
        origin: Vector3<f64>,
        cell_size: f64,
        rows: usize,
        cols: usize,
        z: usize,
    ) -> SdfResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SdfError::InvalidGrid(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if rows == 0 || cols == 0 || z == 0 {
            return Err(SdfError::InvalidGrid(format!(
                "grid dimensions must be non-zero, got {rows}x{cols}x{z}"
            )));
        }
        Ok(Self {
            origin,
            cell_size,
            rows,
            cols,
            slices: vec![DMatrix::zeros(rows, cols); z],
        })
    }

    /// Build a field from complete slice data.
    pub fn from_slices(
        origin: Vector3<f64>,
        cell_size: f64,
        slices: Vec<DMatrix<f64>>,
    ) -> SdfResult<Self> {
        let first = slices
            .first()
            .ok_or_else(|| SdfError::InvalidGrid("no slices supplied".to_string()))?;
        let mut field = Self::new(origin, cell_size, first.nrows(), first.ncols(), slices.len())?;
        for (k, slice) in slices.into_iter().enumerate() {
            field.init_field_data(k, slice)?;
        }
        Ok(field)
    }

    /// Store slice `z_idx`.
    ///
    /// # Errors
    /// `SliceOutOfRange` or `ShapeMismatch` when the slice does not fit the grid.
    pub fn init_field_data(&mut self, z_idx: usize, field_layer: DMatrix<f64>) -> SdfResult<()> {
        if z_idx >= self.slices.len() {
            return Err(SdfError::SliceOutOfRange {
                index: z_idx,
                count: self.slices.len(),
            });
        }
        if field_layer.nrows() != self.rows || field_layer.ncols() != self.cols {
            return Err(SdfError::ShapeMismatch {
                expected_rows: self.rows,
                expected_cols: self.cols,
                rows: field_layer.nrows(),
                cols: field_layer.ncols(),
            });
        }
        self.slices[z_idx] = field_layer;
        Ok(())
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn z_count(&self) -> usize {
        self.slices.len()
    }

    pub fn slice(&self, z_idx: usize) -> Option<&DMatrix<f64>> {
        self.slices.get(z_idx)
    }

    /// Continuous (col, row, slice) grid coordinates of a point
    fn grid_coords(&self, point: &Vector3<f64>) -> Vector3<f64> {
        (point - self.origin) / self.cell_size
    }

    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        let g = self.grid_coords(point);
        AxisSample::contains(g.x, self.cols)
            && AxisSample::contains(g.y, self.rows)
            && AxisSample::contains(g.z, self.slices.len())
    }

    /// Trilinear interpolation, clamped to the grid.
    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.signed_distance_with_gradient(point).0
    }

    /// # Errors
    /// `QueryOutOfRange` when the point lies outside the grid.
    pub fn try_signed_distance(&self, point: &Vector3<f64>) -> SdfResult<f64> {
        if !self.contains(point) {
            return Err(SdfError::QueryOutOfRange {
                x: point.x,
                y: point.y,
                z: point.z,
            });
        }
        Ok(self.signed_distance(point))
    }

    /// Interpolated distance and its gradient with respect to the query point.
    pub fn signed_distance_with_gradient(&self, point: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let g = self.grid_coords(point);
        let cx = AxisSample::locate(g.x, self.cols);
        let ry = AxisSample::locate(g.y, self.rows);
        let sz = AxisSample::locate(g.z, self.slices.len());

        let at = |r: usize, c: usize, k: usize| self.slices[k][(r, c)];
        let (tx, ty, tz) = (cx.t, ry.t, sz.t);

        // bilinear values on the two bounding slices, plus their in-plane derivatives
        let plane = |k: usize| {
            let d00 = at(ry.lo, cx.lo, k);
            let d01 = at(ry.lo, cx.hi, k);
            let d10 = at(ry.hi, cx.lo, k);
            let d11 = at(ry.hi, cx.hi, k);
            let value =
                (1.0 - ty) * ((1.0 - tx) * d00 + tx * d01) + ty * ((1.0 - tx) * d10 + tx * d11);
            let dx = (1.0 - ty) * (d01 - d00) + ty * (d11 - d10);
            let dy = (1.0 - tx) * (d10 - d00) + tx * (d11 - d01);
            (value, dx, dy)
        };
        let (v0, dx0, dy0) = plane(sz.lo);
        let (v1, dx1, dy1) = plane(sz.hi);

        let value = (1.0 - tz) * v0 + tz * v1;
        let mut gradient = Vector3::zeros();
        if !cx.clamped {
            gradient.x = ((1.0 - tz) * dx0 + tz * dx1) / self.cell_size;
        }
        if !ry.clamped {
            gradient.y = ((1.0 - tz) * dy0 + tz * dy1) / self.cell_size;
        }
        if !sz.clamped {
            gradient.z = (v1 - v0) / self.cell_size;
        }
        (value, gradient)
    }
}

impl DistanceField for SignedDistanceField {
    fn distance_and_gradient(&self, point: &Vector3<f64>) -> (f64, Vector3<f64>) {
        self.signed_distance_with_gradient(point)
    }
}
