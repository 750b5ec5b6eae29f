//! Trajectory planning on top of the factor-graph solver.
//!
//! - [`setting`]: validated planning configuration
//! - [`trajectory`]: support states and their variable keys
//! - [`graph`]: factor graph assembly shared by batch and incremental planning
//! - [`batch`]: one-shot optimization
//! - [`incremental`]: replanning sessions
//! - [`traj_utils`]: initialization, densification and collision cost

pub mod batch;
pub mod graph;
pub mod incremental;
pub mod setting;
pub mod traj_utils;
pub mod trajectory;

pub use batch::{
    PlanningResult, batch_traj_optimize, batch_traj_optimize_2d_arm, batch_traj_optimize_2d_point_robot,
    batch_traj_optimize_3d_arm,
};
pub use graph::{AssembledGraph, BoundaryBlocks, TrajectoryGraph};
pub use incremental::{IncrementalTrajOptimizer, SessionState, UpdateSummary};
pub use setting::{BoundaryConstraint, JointLimits, SettingParams, TrajOptimizerSetting, VelocityLimits};
pub use traj_utils::{collision_cost, init_arm_traj_straight_line, interpolate_arm_traj};
pub use trajectory::{Trajectory, TrajectoryState, conf_key, vel_key};
