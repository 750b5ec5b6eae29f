//! Replanning session over a persistent trajectory graph.
//!
//! The session owns its graph and current estimate. Edits (a new goal, extra
//! fixed states) patch the graph in place and mark the touched states dirty;
//! the next [`IncrementalTrajOptimizer::update`] re-solves warm-started from
//! the current estimate. [`IncrementalTrajOptimizer::branch`] clones the whole
//! session so alternatives can be explored without disturbing the original.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;
use tracing::{debug, info, warn};

use super::graph::{BoundaryBlocks, TrajectoryGraph};
use super::setting::{BoundaryConstraint, TrajOptimizerSetting};
use super::traj_utils::init_arm_traj_straight_line;
use super::trajectory::Trajectory;
use crate::core::{Problem, Values};
use crate::error::{PlannerError, PlannerResult};
use crate::kinematics::{ForwardKinematics, RobotModel};
use crate::obstacle::DistanceField;
use crate::optimizer::{OptimizationStatus, Solver};

/// Lifecycle of a session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No graph yet
    #[default]
    Uninitialized,
    /// Graph built; the estimate is the last successful solve or the warm start
    Ready,
    /// The last solve hit a numerical failure; the estimate is its best iterate
    Degraded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// What one [`IncrementalTrajOptimizer::update`] did.
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub status: OptimizationStatus,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    /// States edited since the previous update
    pub dirty_states: usize,
}

/// Incremental trajectory optimizer for one robot in one field.
#[derive(Debug)]
pub struct IncrementalTrajOptimizer<FK: ForwardKinematics, F: DistanceField> {
    graph: TrajectoryGraph<FK, F>,
    problem: Problem,
    estimate: Values,
    goal: Option<BoundaryBlocks>,
    fixed_states: BTreeMap<usize, BoundaryBlocks>,
    dirty: BTreeSet<usize>,
    state: SessionState,
    updated: bool,
}

impl<FK: ForwardKinematics, F: DistanceField> Clone for IncrementalTrajOptimizer<FK, F> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            problem: self.problem.clone(),
            estimate: self.estimate.clone(),
            goal: self.goal,
            fixed_states: self.fixed_states.clone(),
            dirty: self.dirty.clone(),
            state: self.state,
            updated: self.updated,
        }
    }
}

impl<FK, F> IncrementalTrajOptimizer<FK, F>
where
    FK: ForwardKinematics + 'static,
    F: DistanceField + 'static,
{
    pub fn new(robot: Arc<RobotModel<FK>>, field: Arc<F>, setting: TrajOptimizerSetting) -> PlannerResult<Self> {
        Ok(Self {
            graph: TrajectoryGraph::new(robot, field, setting)?,
            problem: Problem::new(),
            estimate: Values::new(),
            goal: None,
            fixed_states: BTreeMap::new(),
            dirty: BTreeSet::new(),
            state: SessionState::Uninitialized,
            updated: false,
        })
    }

    fn require_graph(&self, operation: &str) -> PlannerResult<()> {
        if self.state == SessionState::Uninitialized {
            return Err(PlannerError::PreconditionViolation(format!(
                "{operation} called before init_factor_graph"
            )));
        }
        Ok(())
    }

    fn setting(&self) -> &TrajOptimizerSetting {
        self.graph.setting()
    }

    fn mark_all_dirty(&mut self) {
        self.dirty = (0..=self.setting().total_step()).collect();
    }

    /// Build the graph between a start and a goal state.
    ///
    /// The estimate starts as the straight line between the two
    /// configurations. Calling this again discards the previous graph, its
    /// fixed states and its estimate.
    pub fn init_factor_graph(
        &mut self,
        start_conf: &DVector<f64>,
        start_vel: &DVector<f64>,
        goal_conf: &DVector<f64>,
        goal_vel: &DVector<f64>,
    ) -> PlannerResult<()> {
        self.graph.check_state(start_conf, start_vel)?;
        self.graph.check_state(goal_conf, goal_vel)?;
        let setting = self.setting();
        let mut estimate = init_arm_traj_straight_line(
            start_conf,
            goal_conf,
            setting.total_step(),
            setting.total_time(),
        )?
        .to_values();
        let assembled = self
            .graph
            .build(&mut estimate, start_conf, start_vel, goal_conf, goal_vel)?;

        self.problem = assembled.problem;
        self.estimate = estimate;
        self.goal = Some(assembled.goal);
        self.fixed_states.clear();
        self.updated = false;
        self.state = SessionState::Ready;
        self.mark_all_dirty();
        info!(
            "Incremental session initialized: {} states, {} residual blocks",
            self.setting().total_step() + 1,
            self.problem.num_residual_blocks()
        );
        Ok(())
    }

    /// Replace the warm start. Fixed variables keep their constrained values.
    pub fn init_values(&mut self, trajectory: &Trajectory) -> PlannerResult<()> {
        self.require_graph("init_values")?;
        self.graph.check_trajectory(trajectory)?;
        let mut estimate = trajectory.to_values();
        for (key, value) in self.estimate.iter() {
            if self.problem.is_fixed(key) {
                estimate.insert(key, value.clone());
            }
        }
        self.estimate = estimate;
        self.mark_all_dirty();
        Ok(())
    }

    /// Re-solve with all pending edits, starting from the current estimate.
    pub fn update(&mut self) -> PlannerResult<UpdateSummary> {
        self.require_graph("update")?;
        let dirty_states = self.dirty.len();
        let mut solver = self.setting().build_solver();
        let result = solver.optimize(&self.problem, &self.estimate)?;

        self.state = match result.status {
            OptimizationStatus::NumericalFailure | OptimizationStatus::Failed(_) => {
                warn!("Incremental update degraded: {}", result.status);
                SessionState::Degraded
            }
            _ => SessionState::Ready,
        };
        debug!(
            "Incremental update over {} dirty states: {}, cost {:.6e} -> {:.6e} in {} iterations",
            dirty_states, result.status, result.init_cost, result.final_cost, result.iterations
        );
        self.estimate = result.parameters;
        self.dirty.clear();
        self.updated = true;

        Ok(UpdateSummary {
            status: result.status,
            initial_cost: result.init_cost,
            final_cost: result.final_cost,
            iterations: result.iterations,
            dirty_states,
        })
    }

    /// Move the goal. The goal keeps the session's boundary policy.
    pub fn change_goal_config_and_vel(&mut self, conf: &DVector<f64>, vel: &DVector<f64>) -> PlannerResult<()> {
        self.require_graph("change_goal_config_and_vel")?;
        self.graph.check_state(conf, vel)?;
        let goal_idx = self.setting().total_step();
        let constraint = self.setting().boundary();
        if let Some(old) = self.goal.take() {
            self.graph.remove_boundary(&mut self.problem, &old);
        }
        let blocks = self
            .graph
            .add_boundary(&mut self.problem, &mut self.estimate, goal_idx, conf, vel, constraint)?;
        self.goal = Some(blocks);
        self.dirty.insert(goal_idx);
        Ok(())
    }

    /// Hold state `state_idx` exactly at `(conf, vel)`, replacing any earlier
    /// constraint added for the same state.
    pub fn fix_config_and_vel(
        &mut self,
        state_idx: usize,
        conf: &DVector<f64>,
        vel: &DVector<f64>,
    ) -> PlannerResult<()> {
        self.require_graph("fix_config_and_vel")?;
        let total_step = self.setting().total_step();
        if state_idx > total_step {
            return Err(PlannerError::InvalidInput(format!(
                "state index {state_idx} out of range 0..={total_step}"
            )));
        }
        self.graph.check_state(conf, vel)?;
        if let Some(old) = self.fixed_states.remove(&state_idx) {
            self.graph.remove_boundary(&mut self.problem, &old);
        }
        let blocks = self.graph.add_boundary(
            &mut self.problem,
            &mut self.estimate,
            state_idx,
            conf,
            vel,
            BoundaryConstraint::Hard,
        )?;
        self.fixed_states.insert(state_idx, blocks);
        self.dirty.insert(state_idx);
        Ok(())
    }

    /// Current estimate; available once [`Self::update`] has run.
    pub fn values(&self) -> PlannerResult<&Values> {
        if !self.updated {
            return Err(PlannerError::PreconditionViolation(
                "values requested before the first update".to_string(),
            ));
        }
        Ok(&self.estimate)
    }

    /// Current estimate as a trajectory; available once [`Self::update`] has run.
    pub fn trajectory(&self) -> PlannerResult<Trajectory> {
        let setting = self.setting();
        Trajectory::from_values(self.values()?, setting.total_step(), setting.delta_t())
    }

    /// Independent copy of the session.
    pub fn branch(&self) -> Self {
        self.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// States edited since the last update
    pub fn dirty_states(&self) -> &BTreeSet<usize> {
        &self.dirty
    }

    pub fn fixed_states(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_states.keys().copied()
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Cost of the current estimate
    pub fn cost(&self) -> PlannerResult<f64> {
        self.require_graph("cost")?;
        Ok(self.problem.compute_cost(&self.estimate)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::kinematics::{BodySphere, PointRobot, PointRobotModel};
    use crate::obstacle::PlanarSdf;
    use crate::optimizer::OptimizerType;
    use crate::planner::setting::SettingParams;
    use nalgebra::{DMatrix, Vector2, Vector3};

    type Session = IncrementalTrajOptimizer<PointRobot, PlanarSdf>;

    fn session(boundary: BoundaryConstraint) -> Session {
        let robot = PointRobotModel::new(
            PointRobot::new(2, 1).unwrap(),
            vec![BodySphere::new(0, 0.1, Vector3::zeros())],
        )
        .unwrap();
        let field = PlanarSdf::new(Vector2::new(-2.0, -2.0), 0.1, DMatrix::from_element(41, 41, 2.0)).unwrap();
        let setting = TrajOptimizerSetting::new(
            SettingParams::new(2)
                .with_total_step(4)
                .with_boundary(boundary)
                .with_optimizer_type(OptimizerType::GaussNewton),
        )
        .unwrap();
        IncrementalTrajOptimizer::new(Arc::new(robot), Arc::new(field), setting).unwrap()
    }

    fn v(x: f64, y: f64) -> DVector<f64> {
        DVector::from_vec(vec![x, y])
    }

    #[test]
    fn test_mutators_require_graph() {
        let mut s = session(BoundaryConstraint::Soft);
        assert_eq!(s.state(), SessionState::Uninitialized);
        let err = s.update().unwrap_err();
        assert!(matches!(err, PlannerError::PreconditionViolation(_)));
        assert!(matches!(
            s.change_goal_config_and_vel(&v(1.0, 0.0), &v(0.0, 0.0)),
            Err(PlannerError::PreconditionViolation(_))
        ));
        assert!(matches!(
            s.fix_config_and_vel(1, &v(1.0, 0.0), &v(0.0, 0.0)),
            Err(PlannerError::PreconditionViolation(_))
        ));
        assert!(s.values().is_err());
    }

    #[test]
    fn test_init_and_update() {
        let mut s = session(BoundaryConstraint::Soft);
        s.init_factor_graph(&v(0.0, 0.0), &v(1.0, 1.0), &v(1.0, 1.0), &v(1.0, 1.0))
            .unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.dirty_states().len(), 5);
        assert!(s.values().is_err());

        let summary = s.update().unwrap();
        assert_eq!(summary.dirty_states, 5);
        assert!(summary.final_cost < 1e-12);
        assert!(s.dirty_states().is_empty());
        assert_eq!(s.values().unwrap().len(), 10);
        let traj = s.trajectory().unwrap();
        assert!((traj.state(2).unwrap().conf[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_goal_change_moves_goal() {
        let mut s = session(BoundaryConstraint::Soft);
        s.init_factor_graph(&v(0.0, 0.0), &v(0.0, 0.0), &v(1.0, 1.0), &v(0.0, 0.0))
            .unwrap();
        s.update().unwrap();
        let blocks_before = s.problem().num_residual_blocks();

        s.change_goal_config_and_vel(&v(1.0, -1.0), &v(0.0, 0.0)).unwrap();
        assert_eq!(s.problem().num_residual_blocks(), blocks_before);
        assert!(s.dirty_states().contains(&4));
        s.update().unwrap();
        let goal = s.trajectory().unwrap().last().conf.clone();
        assert!((goal - v(1.0, -1.0)).amax() < 1e-3);
    }

    #[test]
    fn test_fixed_state_is_exact() {
        let mut s = session(BoundaryConstraint::Soft);
        s.init_factor_graph(&v(0.0, 0.0), &v(0.0, 0.0), &v(1.0, 0.0), &v(0.0, 0.0))
            .unwrap();
        s.fix_config_and_vel(2, &v(0.5, 0.5), &v(0.0, 0.0)).unwrap();
        s.fix_config_and_vel(2, &v(0.5, 0.3), &v(0.0, 0.0)).unwrap();
        assert_eq!(s.fixed_states().collect::<Vec<_>>(), vec![2]);
        s.update().unwrap();
        let traj = s.trajectory().unwrap();
        assert_eq!(traj.state(2).unwrap().conf, v(0.5, 0.3));
        assert!(s.fix_config_and_vel(5, &v(0.0, 0.0), &v(0.0, 0.0)).is_err());
    }

    #[test]
    fn test_hard_goal_change() {
        let mut s = session(BoundaryConstraint::Hard);
        s.init_factor_graph(&v(0.0, 0.0), &v(0.0, 0.0), &v(1.0, 0.0), &v(0.0, 0.0))
            .unwrap();
        s.change_goal_config_and_vel(&v(0.0, 1.0), &v(0.0, 0.0)).unwrap();
        s.update().unwrap();
        assert_eq!(s.trajectory().unwrap().last().conf, v(0.0, 1.0));
    }

    #[test]
    fn test_branch_is_independent() {
        let mut s = session(BoundaryConstraint::Soft);
        s.init_factor_graph(&v(0.0, 0.0), &v(0.0, 0.0), &v(1.0, 0.0), &v(0.0, 0.0))
            .unwrap();
        s.update().unwrap();
        let mut alt = s.branch();
        alt.change_goal_config_and_vel(&v(-1.0, 0.0), &v(0.0, 0.0)).unwrap();
        alt.update().unwrap();
        let original = s.trajectory().unwrap().last().conf.clone();
        let branched = alt.trajectory().unwrap().last().conf.clone();
        assert!((original[0] - 1.0).abs() < 1e-3);
        assert!((branched[0] + 1.0).abs() < 1e-3);
        assert!(s.dirty_states().is_empty());
    }

    #[test]
    fn test_init_values_keeps_fixed_states() {
        let mut s = session(BoundaryConstraint::Hard);
        s.init_factor_graph(&v(0.0, 0.0), &v(0.0, 0.0), &v(1.0, 0.0), &v(0.0, 0.0))
            .unwrap();
        let warm = init_arm_traj_straight_line(&v(0.2, 0.2), &v(0.8, 0.2), 4, 1.0).unwrap();
        s.init_values(&warm).unwrap();
        s.update().unwrap();
        let traj = s.trajectory().unwrap();
        assert_eq!(traj.first().conf, v(0.0, 0.0));
        assert_eq!(traj.last().conf, v(1.0, 0.0));
    }
}
