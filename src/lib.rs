//! gpmp-solver: Gaussian-process motion planning on sparse factor graphs.
//!
//! A trajectory is a sequence of support states (configuration and velocity)
//! tied together by a constant-velocity Gaussian-process prior and pushed out
//! of collision by hinge-loss factors on a signed distance field. The
//! resulting nonlinear least-squares problem is solved with Gauss-Newton,
//! Levenberg-Marquardt or Dog-Leg over a sparse Jacobian.

pub mod core;
pub mod error;
pub mod factors;
pub mod gp;
pub mod io;
pub mod kinematics;
pub mod linalg;
pub mod logger;
pub mod obstacle;
pub mod optimizer;
pub mod planner;

pub use error::{PlannerError, PlannerResult};
pub use logger::{init_logger, init_logger_with_level};
pub use planner::{
    IncrementalTrajOptimizer, PlanningResult, SettingParams, TrajOptimizerSetting, Trajectory, batch_traj_optimize,
};
