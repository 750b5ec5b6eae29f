use nalgebra::DVector;

use crate::core::{VariableId, Values};
use crate::error::{PlannerError, PlannerResult};

/// Key of the configuration of support state `i`
pub fn conf_key(i: usize) -> VariableId {
    VariableId(2 * i)
}

/// Key of the velocity of support state `i`
pub fn vel_key(i: usize) -> VariableId {
    VariableId(2 * i + 1)
}

/// Configuration and joint velocity at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryState {
    pub conf: DVector<f64>,
    pub vel: DVector<f64>,
}

impl TrajectoryState {
    pub fn new(conf: DVector<f64>, vel: DVector<f64>) -> Self {
        Self { conf, vel }
    }
}

/// States sampled every `delta_t` seconds, starting at time 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    delta_t: f64,
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// # Errors
    /// `InvalidInput` for an empty state list, a non-positive `delta_t`, or
    /// states whose configuration and velocity sizes disagree.
    pub fn new(delta_t: f64, states: Vec<TrajectoryState>) -> PlannerResult<Self> {
        if !(delta_t.is_finite() && delta_t > 0.0) {
            return Err(PlannerError::InvalidInput(format!(
                "trajectory time step must be positive, got {delta_t}"
            )));
        }
        let Some(first) = states.first() else {
            return Err(PlannerError::InvalidInput(
                "trajectory needs at least one state".to_string(),
            ));
        };
        let dof = first.conf.len();
        for (i, state) in states.iter().enumerate() {
            if state.conf.len() != dof || state.vel.len() != dof {
                return Err(PlannerError::InvalidInput(format!(
                    "state {i} has conf/vel sizes {}/{}, expected {dof}",
                    state.conf.len(),
                    state.vel.len()
                )));
            }
        }
        Ok(Self { delta_t, states })
    }

    /// Read states `0..=total_step` out of solver values.
    pub fn from_values(values: &Values, total_step: usize, delta_t: f64) -> PlannerResult<Self> {
        let states = (0..=total_step)
            .map(|i| {
                let fetch = |key: VariableId| {
                    values.get(key).cloned().ok_or_else(|| {
                        PlannerError::InvalidInput(format!("no value for {key} of state {i}"))
                    })
                };
                Ok(TrajectoryState::new(fetch(conf_key(i))?, fetch(vel_key(i))?))
            })
            .collect::<PlannerResult<Vec<_>>>()?;
        Self::new(delta_t, states)
    }

    /// Solver values keyed with [`conf_key`] / [`vel_key`]
    pub fn to_values(&self) -> Values {
        let mut values = Values::new();
        for (i, state) in self.states.iter().enumerate() {
            values.insert(conf_key(i), state.conf.clone());
            values.insert(vel_key(i), state.vel.clone());
        }
        values
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    pub fn dof(&self) -> usize {
        self.states[0].conf.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of intervals
    pub fn total_step(&self) -> usize {
        self.states.len() - 1
    }

    pub fn total_time(&self) -> f64 {
        self.delta_t * self.total_step() as f64
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    pub fn state(&self, i: usize) -> Option<&TrajectoryState> {
        self.states.get(i)
    }

    pub fn first(&self) -> &TrajectoryState {
        &self.states[0]
    }

    pub fn last(&self) -> &TrajectoryState {
        &self.states[self.states.len() - 1]
    }

    pub fn time_of(&self, i: usize) -> f64 {
        self.delta_t * i as f64
    }

    pub fn confs(&self) -> impl Iterator<Item = &DVector<f64>> {
        self.states.iter().map(|s| &s.conf)
    }

    /// Replace one state, keeping the sizes consistent.
    pub fn set_state(&mut self, i: usize, state: TrajectoryState) -> PlannerResult<()> {
        let dof = self.dof();
        if state.conf.len() != dof || state.vel.len() != dof {
            return Err(PlannerError::InvalidInput(format!(
                "state has conf/vel sizes {}/{}, expected {dof}",
                state.conf.len(),
                state.vel.len()
            )));
        }
        let len = self.states.len();
        let slot = self.states.get_mut(i).ok_or_else(|| {
            PlannerError::InvalidInput(format!("state index {i} out of range 0..{len}"))
        })?;
        *slot = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn state(q: f64, v: f64) -> TrajectoryState {
        TrajectoryState::new(DVector::from_element(2, q), DVector::from_element(2, v))
    }

    #[test]
    fn test_keys_interleave() {
        assert_eq!(conf_key(0), VariableId(0));
        assert_eq!(vel_key(0), VariableId(1));
        assert_eq!(conf_key(3), VariableId(6));
        assert_eq!(vel_key(3), VariableId(7));
    }

    #[test]
    fn test_values_conversion() {
        let traj = Trajectory::new(0.5, vec![state(0.0, 1.0), state(0.5, 1.0), state(1.0, 1.0)]).unwrap();
        assert_eq!(traj.total_step(), 2);
        assert!((traj.total_time() - 1.0).abs() < 1e-12);
        let values = traj.to_values();
        assert_eq!(values.len(), 6);
        let back = Trajectory::from_values(&values, 2, 0.5).unwrap();
        assert_eq!(back, traj);
        assert!(Trajectory::from_values(&values, 3, 0.5).is_err());
    }

    #[test]
    fn test_invalid_trajectories() {
        assert!(Trajectory::new(0.0, vec![state(0.0, 0.0)]).is_err());
        assert!(Trajectory::new(0.1, vec![]).is_err());
        let bad = TrajectoryState::new(DVector::zeros(2), DVector::zeros(3));
        assert!(Trajectory::new(0.1, vec![state(0.0, 0.0), bad.clone()]).is_err());

        let mut traj = Trajectory::new(0.1, vec![state(0.0, 0.0)]).unwrap();
        assert!(traj.set_state(0, bad).is_err());
        assert!(traj.set_state(1, state(1.0, 0.0)).is_err());
        traj.set_state(0, state(1.0, 0.0)).unwrap();
        assert_eq!(traj.first().conf[0], 1.0);
    }
}
