use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{DMatrix, Vector2, Vector3};
use rayon::prelude::*;
use tracing::debug;

use super::{IoError, IoResult, Record, parse_f64, parse_row, parse_usize, records, with_mapped_text};
use crate::obstacle::{PlanarSdf, SignedDistanceField};

const PLANAR_TAG: &str = "PLANAR_SDF";
const SPATIAL_TAG: &str = "SDF";

/// Text loader and writer for distance fields.
///
/// Planar files start with `PLANAR_SDF rows cols origin_x origin_y cell_size`
/// followed by `rows` lines of `cols` distances. Spatial files start with
/// `SDF rows cols z origin_x origin_y origin_z cell_size` followed by the `z`
/// slices one after the other, `rows` lines each.
pub struct SdfLoader;

impl SdfLoader {
    pub fn load_planar<P: AsRef<Path>>(path: P) -> IoResult<PlanarSdf> {
        with_mapped_text(path, Self::parse_planar)
    }

    pub fn load_spatial<P: AsRef<Path>>(path: P) -> IoResult<SignedDistanceField> {
        with_mapped_text(path, Self::parse_spatial)
    }

    pub fn write_planar<P: AsRef<Path>>(sdf: &PlanarSdf, path: P) -> IoResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "{PLANAR_TAG} {} {} {} {} {}",
            sdf.rows(),
            sdf.cols(),
            sdf.origin().x,
            sdf.origin().y,
            sdf.cell_size()
        )?;
        write_matrix(&mut out, sdf.data())?;
        out.flush()?;
        Ok(())
    }

    pub fn write_spatial<P: AsRef<Path>>(sdf: &SignedDistanceField, path: P) -> IoResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        let origin = sdf.origin();
        writeln!(
            out,
            "{SPATIAL_TAG} {} {} {} {} {} {} {}",
            sdf.rows(),
            sdf.cols(),
            sdf.z_count(),
            origin.x,
            origin.y,
            origin.z,
            sdf.cell_size()
        )?;
        for k in 0..sdf.z_count() {
            if let Some(slice) = sdf.slice(k) {
                write_matrix(&mut out, slice)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn parse_planar(content: &str) -> IoResult<PlanarSdf> {
        let recs = records(content);
        let (header, body) = split_header(&recs, PLANAR_TAG, 6)?;
        let rows = parse_usize(header[1], 0)?;
        let cols = parse_usize(header[2], 0)?;
        let origin = Vector2::new(parse_f64(header[3], 0)?, parse_f64(header[4], 0)?);
        let cell_size = parse_f64(header[5], 0)?;

        let data = parse_grid(body, rows, cols)?;
        debug!("Loaded planar SDF: {}x{} cells of {}", rows, cols, cell_size);
        Ok(PlanarSdf::new(origin, cell_size, data)?)
    }

    fn parse_spatial(content: &str) -> IoResult<SignedDistanceField> {
        let recs = records(content);
        let (header, body) = split_header(&recs, SPATIAL_TAG, 8)?;
        let rows = parse_usize(header[1], 0)?;
        let cols = parse_usize(header[2], 0)?;
        let z = parse_usize(header[3], 0)?;
        let origin = Vector3::new(
            parse_f64(header[4], 0)?,
            parse_f64(header[5], 0)?,
            parse_f64(header[6], 0)?,
        );
        let cell_size = parse_f64(header[7], 0)?;

        let expected = rows.checked_mul(z).ok_or_else(|| IoError::Parse {
            line: recs.first().map_or(0, |r| r.line),
            message: format!("grid of {rows} rows by {z} slices is too large"),
        })?;
        if body.len() != expected {
            return Err(IoError::Parse {
                line: body.last().map_or(0, |r| r.line),
                message: format!("expected {} grid rows, found {}", expected, body.len()),
            });
        }
        let slices = body
            .chunks(rows.max(1))
            .map(|chunk| parse_grid(chunk, rows, cols))
            .collect::<IoResult<Vec<_>>>()?;
        debug!("Loaded SDF: {}x{}x{} cells of {}", rows, cols, z, cell_size);
        Ok(SignedDistanceField::from_slices(origin, cell_size, slices)?)
    }
}

/// Split off and check the header record; the line number of the header is
/// reported through the first record.
fn split_header<'a, 'b>(
    recs: &'b [Record<'a>],
    tag: &str,
    fields: usize,
) -> IoResult<(Vec<&'a str>, &'b [Record<'a>])> {
    let Some((first, body)) = recs.split_first() else {
        return Err(IoError::Parse {
            line: 0,
            message: format!("missing {tag} header"),
        });
    };
    let header: Vec<&str> = first.text.split_whitespace().collect();
    if header.first() != Some(&tag) {
        return Err(IoError::Parse {
            line: first.line,
            message: format!("expected {tag} header, found '{}'", first.text),
        });
    }
    if header.len() != fields {
        return Err(IoError::FieldCount {
            line: first.line,
            expected: fields,
            actual: header.len(),
        });
    }
    Ok((header, body))
}

fn parse_grid(body: &[Record<'_>], rows: usize, cols: usize) -> IoResult<DMatrix<f64>> {
    if body.len() != rows {
        return Err(IoError::Parse {
            line: body.last().map_or(0, |r| r.line),
            message: format!("expected {rows} grid rows, found {}", body.len()),
        });
    }
    let parsed = body
        .par_iter()
        .map(|record| parse_row(record, cols))
        .collect::<IoResult<Vec<_>>>()?;
    Ok(DMatrix::from_fn(rows, cols, |r, c| parsed[r][c]))
}

fn write_matrix<W: Write>(out: &mut W, data: &DMatrix<f64>) -> IoResult<()> {
    for r in 0..data.nrows() {
        let row: Vec<String> = (0..data.ncols()).map(|c| data[(r, c)].to_string()).collect();
        writeln!(out, "{}", row.join(" "))?;
    }
    Ok(())
}
