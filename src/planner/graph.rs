//! Assembly of the trajectory factor graph.
//!
//! Every support state `i` gets a collision factor (and optional limit
//! factors); every interval `(i - 1, i)` gets a GP prior and, when interpolated
//! checks are enabled, a collision factor at the interpolated configurations.
//! Factors with identical parameters are built once and shared across states.

use std::sync::Arc;

use nalgebra::DVector;
use tracing::debug;

use super::setting::{BoundaryConstraint, TrajOptimizerSetting};
use super::trajectory::{Trajectory, conf_key, vel_key};
use crate::core::{Problem, Values};
use crate::error::{PlannerError, PlannerResult};
use crate::factors::{
    Factor, GaussianNoise, GaussianProcessPriorFactor, InterpolatedObstacleFactor,
    JointLimitFactor, ObstacleFactor, PriorFactor, VelocityLimitFactor,
};
use crate::kinematics::{ForwardKinematics, RobotModel};
use crate::obstacle::DistanceField;

/// Residual blocks that pin one state, or nothing when the state is held fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryBlocks {
    pub state_idx: usize,
    pub conf_block: Option<usize>,
    pub vel_block: Option<usize>,
    pub constraint: BoundaryConstraint,
}

/// A freshly assembled graph with its boundary handles.
#[derive(Debug, Clone)]
pub struct AssembledGraph {
    pub problem: Problem,
    pub start: BoundaryBlocks,
    pub goal: BoundaryBlocks,
}

/// Builds trajectory graphs for one robot, one field and one setting.
pub struct TrajectoryGraph<FK: ForwardKinematics, F: DistanceField> {
    robot: Arc<RobotModel<FK>>,
    field: Arc<F>,
    setting: TrajOptimizerSetting,
    obstacle: Arc<dyn Factor>,
    gp_prior: Arc<dyn Factor>,
    interpolated_obstacle: Option<Arc<dyn Factor>>,
    joint_limit: Option<Arc<dyn Factor>>,
    velocity_limit: Option<Arc<dyn Factor>>,
}

impl<FK, F> TrajectoryGraph<FK, F>
where
    FK: ForwardKinematics + 'static,
    F: DistanceField + 'static,
{
    /// # Errors
    /// `InvalidInput` when the robot's DOF differs from the setting's.
    pub fn new(robot: Arc<RobotModel<FK>>, field: Arc<F>, setting: TrajOptimizerSetting) -> PlannerResult<Self> {
        if robot.dof() != setting.dof() {
            return Err(PlannerError::InvalidInput(format!(
                "robot has {} joints, setting is for {}",
                robot.dof(),
                setting.dof()
            )));
        }
        let delta_t = setting.delta_t();
        let obstacle: Arc<dyn Factor> = Arc::new(ObstacleFactor::new(
            robot.clone(),
            field.clone(),
            setting.cost_sigma(),
            setting.epsilon(),
        )?);
        let gp_prior: Arc<dyn Factor> = Arc::new(GaussianProcessPriorFactor::new(setting.qc(), delta_t)?);
        let interpolated_obstacle = if setting.obs_check_inter() > 0 {
            let factor: Arc<dyn Factor> = Arc::new(InterpolatedObstacleFactor::with_check_points(
                robot.clone(),
                field.clone(),
                setting.cost_sigma(),
                setting.epsilon(),
                setting.qc(),
                delta_t,
                setting.obs_check_inter(),
            )?);
            Some(factor)
        } else {
            None
        };
        let joint_limit = match setting.joint_limits() {
            Some(limits) => {
                let factor: Arc<dyn Factor> = Arc::new(JointLimitFactor::new(
                    limits.down.clone(),
                    limits.up.clone(),
                    limits.thresh.clone(),
                    GaussianNoise::isotropic(setting.dof(), limits.sigma)?,
                )?);
                Some(factor)
            }
            None => None,
        };
        let velocity_limit = match setting.velocity_limits() {
            Some(limits) => {
                let factor: Arc<dyn Factor> = Arc::new(VelocityLimitFactor::new(
                    limits.limits.clone(),
                    limits.thresh.clone(),
                    GaussianNoise::isotropic(setting.dof(), limits.sigma)?,
                )?);
                Some(factor)
            }
            None => None,
        };

        Ok(Self {
            robot,
            field,
            setting,
            obstacle,
            gp_prior,
            interpolated_obstacle,
            joint_limit,
            velocity_limit,
        })
    }

    pub fn robot(&self) -> &Arc<RobotModel<FK>> {
        &self.robot
    }

    pub fn field(&self) -> &Arc<F> {
        &self.field
    }

    pub fn setting(&self) -> &TrajOptimizerSetting {
        &self.setting
    }

    /// Check a boundary configuration and velocity against the setting's DOF.
    pub fn check_state(&self, conf: &DVector<f64>, vel: &DVector<f64>) -> PlannerResult<()> {
        let dof = self.setting.dof();
        if conf.len() != dof || vel.len() != dof {
            return Err(PlannerError::InvalidInput(format!(
                "boundary state has conf/vel sizes {}/{}, expected {dof}",
                conf.len(),
                vel.len()
            )));
        }
        Ok(())
    }

    /// Check that a warm start has one state per support time and the right DOF.
    pub fn check_trajectory(&self, trajectory: &Trajectory) -> PlannerResult<()> {
        if trajectory.total_step() != self.setting.total_step() || trajectory.dof() != self.setting.dof() {
            return Err(PlannerError::InvalidInput(format!(
                "initial trajectory has {} states of dof {}, expected {} of dof {}",
                trajectory.len(),
                trajectory.dof(),
                self.setting.total_step() + 1,
                self.setting.dof()
            )));
        }
        Ok(())
    }

    /// Per-state factors: collision and optional limits.
    pub fn add_state_factors(&self, problem: &mut Problem, i: usize) {
        problem.add_residual_block(&[conf_key(i)], self.obstacle.clone());
        if let Some(factor) = &self.joint_limit {
            problem.add_residual_block(&[conf_key(i)], factor.clone());
        }
        if let Some(factor) = &self.velocity_limit {
            problem.add_residual_block(&[vel_key(i)], factor.clone());
        }
    }

    /// Interval factors between states `i - 1` and `i`.
    pub fn add_interval_factors(&self, problem: &mut Problem, i: usize) {
        let keys = [conf_key(i - 1), vel_key(i - 1), conf_key(i), vel_key(i)];
        problem.add_residual_block(&keys, self.gp_prior.clone());
        if let Some(factor) = &self.interpolated_obstacle {
            problem.add_residual_block(&keys, factor.clone());
        }
    }

    /// Pin state `i` to `(conf, vel)` with the setting's boundary policy.
    ///
    /// With [`BoundaryConstraint::Hard`] the variables are fixed and `values`
    /// is overwritten; with soft priors `values` is left alone.
    pub fn add_boundary(
        &self,
        problem: &mut Problem,
        values: &mut Values,
        i: usize,
        conf: &DVector<f64>,
        vel: &DVector<f64>,
        constraint: BoundaryConstraint,
    ) -> PlannerResult<BoundaryBlocks> {
        self.check_state(conf, vel)?;
        match constraint {
            BoundaryConstraint::Soft => {
                let conf_prior = PriorFactor::new(conf.clone(), self.setting.conf_prior_model().clone())?;
                let vel_prior = PriorFactor::new(vel.clone(), self.setting.vel_prior_model().clone())?;
                Ok(BoundaryBlocks {
                    state_idx: i,
                    conf_block: Some(problem.add_residual_block(&[conf_key(i)], Arc::new(conf_prior))),
                    vel_block: Some(problem.add_residual_block(&[vel_key(i)], Arc::new(vel_prior))),
                    constraint,
                })
            }
            BoundaryConstraint::Hard => {
                problem.fix_variable(conf_key(i));
                problem.fix_variable(vel_key(i));
                values.insert(conf_key(i), conf.clone());
                values.insert(vel_key(i), vel.clone());
                Ok(BoundaryBlocks {
                    state_idx: i,
                    conf_block: None,
                    vel_block: None,
                    constraint,
                })
            }
        }
    }

    /// Undo [`Self::add_boundary`].
    pub fn remove_boundary(&self, problem: &mut Problem, blocks: &BoundaryBlocks) {
        for block in [blocks.conf_block, blocks.vel_block].into_iter().flatten() {
            problem.remove_residual_block(block);
        }
        if blocks.constraint == BoundaryConstraint::Hard {
            problem.unfix_variable(conf_key(blocks.state_idx));
            problem.unfix_variable(vel_key(blocks.state_idx));
        }
    }

    /// Complete graph between a start and a goal state.
    pub fn build(
        &self,
        values: &mut Values,
        start_conf: &DVector<f64>,
        start_vel: &DVector<f64>,
        goal_conf: &DVector<f64>,
        goal_vel: &DVector<f64>,
    ) -> PlannerResult<AssembledGraph> {
        let total_step = self.setting.total_step();
        let boundary = self.setting.boundary();
        let mut problem = Problem::new();

        let start = self.add_boundary(&mut problem, values, 0, start_conf, start_vel, boundary)?;
        let goal = self.add_boundary(&mut problem, values, total_step, goal_conf, goal_vel, boundary)?;
        for i in 0..=total_step {
            self.add_state_factors(&mut problem, i);
            if i > 0 {
                self.add_interval_factors(&mut problem, i);
            }
        }
        debug!(
            "Trajectory graph: {} states, {} residual blocks, {} residuals",
            total_step + 1,
            problem.num_residual_blocks(),
            problem.total_residual_dimension
        );
        Ok(AssembledGraph { problem, start, goal })
    }

    /// Graph holding only the collision factors of a trajectory.
    pub fn collision_problem(&self, total_step: usize) -> Problem {
        let mut problem = Problem::new();
        for i in 0..=total_step {
            problem.add_residual_block(&[conf_key(i)], self.obstacle.clone());
            if i > 0
                && let Some(factor) = &self.interpolated_obstacle
            {
                problem.add_residual_block(
                    &[conf_key(i - 1), vel_key(i - 1), conf_key(i), vel_key(i)],
                    factor.clone(),
                );
            }
        }
        problem
    }
}

impl<FK: ForwardKinematics, F: DistanceField> Clone for TrajectoryGraph<FK, F> {
    fn clone(&self) -> Self {
        Self {
            robot: self.robot.clone(),
            field: self.field.clone(),
            setting: self.setting.clone(),
            obstacle: self.obstacle.clone(),
            gp_prior: self.gp_prior.clone(),
            interpolated_obstacle: self.interpolated_obstacle.clone(),
            joint_limit: self.joint_limit.clone(),
            velocity_limit: self.velocity_limit.clone(),
        }
    }
}

impl<FK: ForwardKinematics, F: DistanceField> std::fmt::Debug for TrajectoryGraph<FK, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrajectoryGraph")
            .field("dof", &self.setting.dof())
            .field("total_step", &self.setting.total_step())
            .field("nr_body_spheres", &self.robot.nr_body_spheres())
            .field("interpolated_checks", &self.setting.obs_check_inter())
            .finish()
    }
}
