use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DVector;
use rayon::prelude::*;

use super::{IoError, IoResult, parse_row, records, with_mapped_text};
use crate::planner::{Trajectory, TrajectoryState};

/// Relative slack allowed between a stored time stamp and `i * delta_t`
const TIME_TOLERANCE: f64 = 1e-6;

/// Write one `t q_1 .. q_n v_1 .. v_n` line per state.
pub fn write_trajectory<P: AsRef<Path>>(traj: &Trajectory, path: P) -> IoResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# t q[{0}] v[{0}]", traj.dof())?;
    for (i, state) in traj.states().iter().enumerate() {
        let mut line = traj.time_of(i).to_string();
        for x in state.conf.iter().chain(state.vel.iter()) {
            line.push(' ');
            line.push_str(&x.to_string());
        }
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// Read a trajectory written by [`write_trajectory`].
///
/// The DOF follows from the column count and the time step from the first two
/// time stamps; later stamps must lie on the same uniform grid.
pub fn load_trajectory<P: AsRef<Path>>(path: P) -> IoResult<Trajectory> {
    with_mapped_text(path, parse_trajectory)
}

fn parse_trajectory(content: &str) -> IoResult<Trajectory> {
    let recs = records(content);
    if recs.len() < 2 {
        return Err(IoError::Trajectory(format!(
            "need at least two states to recover the time step, found {}",
            recs.len()
        )));
    }
    let columns = recs[0].text.split_whitespace().count();
    if columns < 3 || columns % 2 == 0 {
        return Err(IoError::Parse {
            line: recs[0].line,
            message: format!("expected 1 + 2 * dof columns, found {columns}"),
        });
    }
    let dof = (columns - 1) / 2;

    let rows = recs
        .par_iter()
        .map(|record| parse_row(record, columns))
        .collect::<IoResult<Vec<_>>>()?;

    let delta_t = rows[1][0] - rows[0][0];
    if !(delta_t.is_finite() && delta_t > 0.0) {
        return Err(IoError::Parse {
            line: recs[1].line,
            message: format!("time stamps must increase, got step {delta_t}"),
        });
    }
    let t0 = rows[0][0];
    let mut states = Vec::with_capacity(rows.len());
    for (i, (row, record)) in rows.iter().zip(&recs).enumerate() {
        let expected = t0 + delta_t * i as f64;
        if (row[0] - expected).abs() > TIME_TOLERANCE * expected.abs().max(delta_t) {
            return Err(IoError::Parse {
                line: record.line,
                message: format!("time stamp {} is off the uniform grid (expected {expected})", row[0]),
            });
        }
        states.push(TrajectoryState::new(
            DVector::from_column_slice(&row[1..=dof]),
            DVector::from_column_slice(&row[dof + 1..]),
        ));
    }
    Trajectory::new(delta_t, states).map_err(|e| IoError::Trajectory(e.to_string()))
}
