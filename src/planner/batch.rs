//! One-shot trajectory optimization.

use std::sync::Arc;
use std::time::Duration;

use nalgebra::DVector;
use tracing::{info, warn};

use super::graph::TrajectoryGraph;
use super::setting::TrajOptimizerSetting;
use super::trajectory::Trajectory;
use crate::error::PlannerResult;
use crate::kinematics::{ArmModel, ForwardKinematics, PointRobotModel, RobotModel};
use crate::obstacle::{DistanceField, PlanarSdf, SignedDistanceField};
use crate::optimizer::{OptimizationStatus, Solver};

/// Outcome of a planning run.
///
/// A run that stops on the iteration limit still carries its best trajectory;
/// check [`PlanningResult::status`] to tell the cases apart.
#[derive(Debug, Clone)]
pub struct PlanningResult {
    pub trajectory: Trajectory,
    pub status: OptimizationStatus,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub elapsed_time: Duration,
}

impl PlanningResult {
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}

/// Optimize a trajectory from `start` to `end`, warm-started at `init_values`.
///
/// # Errors
/// `InvalidInput` when the boundary states or the warm start do not match the
/// setting. Failing to converge is not an error.
#[allow(clippy::too_many_arguments)]
pub fn batch_traj_optimize<FK, F>(
    robot: Arc<RobotModel<FK>>,
    field: Arc<F>,
    start_conf: &DVector<f64>,
    start_vel: &DVector<f64>,
    end_conf: &DVector<f64>,
    end_vel: &DVector<f64>,
    init_values: &Trajectory,
    setting: &TrajOptimizerSetting,
) -> PlannerResult<PlanningResult>
where
    FK: ForwardKinematics + 'static,
    F: DistanceField + 'static,
{
    let graph = TrajectoryGraph::new(robot, field, setting.clone())?;
    graph.check_trajectory(init_values)?;

    let mut values = init_values.to_values();
    let assembled = graph.build(&mut values, start_conf, start_vel, end_conf, end_vel)?;

    let mut solver = setting.build_solver();
    let result = solver.optimize(&assembled.problem, &values)?;
    match result.status {
        OptimizationStatus::NumericalFailure
        | OptimizationStatus::Failed(_)
        | OptimizationStatus::CostIncreased => {
            warn!("Trajectory optimization stopped early: {}", result.status)
        }
        _ => info!(
            "Trajectory optimization ({}): {}, cost {:.6e} -> {:.6e} in {} iterations",
            solver.optimizer_type(),
            result.status,
            result.init_cost,
            result.final_cost,
            result.iterations
        ),
    }

    let trajectory = Trajectory::from_values(&result.parameters, setting.total_step(), setting.delta_t())?;
    Ok(PlanningResult {
        trajectory,
        status: result.status,
        initial_cost: result.init_cost,
        final_cost: result.final_cost,
        iterations: result.iterations,
        elapsed_time: result.elapsed_time,
    })
}

/// Planar (or spatial) arm in a planar field.
#[allow(clippy::too_many_arguments)]
pub fn batch_traj_optimize_2d_arm(
    arm: Arc<ArmModel>,
    sdf: Arc<PlanarSdf>,
    start_conf: &DVector<f64>,
    start_vel: &DVector<f64>,
    end_conf: &DVector<f64>,
    end_vel: &DVector<f64>,
    init_values: &Trajectory,
    setting: &TrajOptimizerSetting,
) -> PlannerResult<PlanningResult> {
    batch_traj_optimize(arm, sdf, start_conf, start_vel, end_conf, end_vel, init_values, setting)
}

/// Arm in a 3D field.
#[allow(clippy::too_many_arguments)]
pub fn batch_traj_optimize_3d_arm(
    arm: Arc<ArmModel>,
    sdf: Arc<SignedDistanceField>,
    start_conf: &DVector<f64>,
    start_vel: &DVector<f64>,
    end_conf: &DVector<f64>,
    end_vel: &DVector<f64>,
    init_values: &Trajectory,
    setting: &TrajOptimizerSetting,
) -> PlannerResult<PlanningResult> {
    batch_traj_optimize(arm, sdf, start_conf, start_vel, end_conf, end_vel, init_values, setting)
}

/// Point robot in a planar field.
#[allow(clippy::too_many_arguments)]
pub fn batch_traj_optimize_2d_point_robot(
    robot: Arc<PointRobotModel>,
    sdf: Arc<PlanarSdf>,
    start_conf: &DVector<f64>,
    start_vel: &DVector<f64>,
    end_conf: &DVector<f64>,
    end_vel: &DVector<f64>,
    init_values: &Trajectory,
    setting: &TrajOptimizerSetting,
) -> PlannerResult<PlanningResult> {
    batch_traj_optimize(robot, sdf, start_conf, start_vel, end_conf, end_vel, init_values, setting)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::kinematics::{BodySphere, PointRobot};
    use crate::optimizer::OptimizerType;
    use crate::planner::setting::{BoundaryConstraint, SettingParams};
    use crate::planner::traj_utils::init_arm_traj_straight_line;
    use nalgebra::{DMatrix, Vector2, Vector3};

    fn point_robot() -> Arc<PointRobotModel> {
        Arc::new(
            PointRobotModel::new(
                PointRobot::new(2, 1).unwrap(),
                vec![BodySphere::new(0, 0.1, Vector3::zeros())],
            )
            .unwrap(),
        )
    }

    /// Disc obstacle of radius 0.2 at (0.5, 0) in a 2 x 2 m field.
    fn disc_field() -> Arc<PlanarSdf> {
        let origin = Vector2::new(-0.5, -1.0);
        let cell = 0.02;
        let data = DMatrix::from_fn(101, 101, |r, c| {
            let p = origin + Vector2::new(c as f64, r as f64) * cell;
            (p - Vector2::new(0.5, 0.0)).norm() - 0.2
        });
        Arc::new(PlanarSdf::new(origin, cell, data).unwrap())
    }

    fn v(x: f64, y: f64) -> DVector<f64> {
        DVector::from_vec(vec![x, y])
    }

    #[test]
    fn test_free_straight_line_is_optimal() {
        let setting = TrajOptimizerSetting::new(
            SettingParams::new(2)
                .with_total_step(5)
                .with_optimizer_type(OptimizerType::LevenbergMarquardt),
        )
        .unwrap();
        let start = v(-0.4, 0.8);
        let end = v(0.4, 0.8);
        let vel = (&end - &start) / setting.total_time();
        let init = init_arm_traj_straight_line(&start, &end, 5, 1.0).unwrap();
        let result = batch_traj_optimize_2d_point_robot(
            point_robot(),
            disc_field(),
            &start,
            &vel,
            &end,
            &vel,
            &init,
            &setting,
        )
        .unwrap();
        assert!(result.initial_cost < 1e-12);
        assert!(result.is_converged());
        assert_eq!(result.trajectory, init);
    }

    #[test]
    fn test_obstacle_pushes_path_away() {
        let setting = TrajOptimizerSetting::new(
            SettingParams::new(2)
                .with_total_step(10)
                .with_total_time(10.0)
                .with_epsilon(0.05)
                .with_cost_sigma(0.01)
                .with_obs_check_inter(3)
                .with_rel_thresh(1e-5)
                .with_max_iter(100)
                .with_optimizer_type(OptimizerType::LevenbergMarquardt),
        )
        .unwrap();
        let start = v(0.0, -0.1);
        let end = v(1.0, -0.1);
        let init = init_arm_traj_straight_line(&start, &end, 10, 10.0).unwrap();
        let field = disc_field();
        let result = batch_traj_optimize_2d_point_robot(
            point_robot(),
            field.clone(),
            &start,
            &DVector::zeros(2),
            &end,
            &DVector::zeros(2),
            &init,
            &setting,
        )
        .unwrap();
        assert!(result.final_cost < result.initial_cost);
        for state in result.trajectory.states() {
            let d = field.signed_distance(&Vector2::new(state.conf[0], state.conf[1]));
            assert!(d > 0.1, "state {} at distance {d}", state.conf);
        }
    }

    #[test]
    fn test_hard_boundary_keeps_endpoints_exact() {
        let setting = TrajOptimizerSetting::new(
            SettingParams::new(2)
                .with_total_step(4)
                .with_boundary(BoundaryConstraint::Hard)
                .with_optimizer_type(OptimizerType::GaussNewton),
        )
        .unwrap();
        let start = v(-0.4, 0.5);
        let end = v(0.4, 0.9);
        // warm start deliberately off the boundary
        let init = init_arm_traj_straight_line(&v(-0.3, 0.6), &v(0.3, 0.7), 4, 1.0).unwrap();
        let result = batch_traj_optimize_2d_point_robot(
            point_robot(),
            disc_field(),
            &start,
            &DVector::zeros(2),
            &end,
            &DVector::zeros(2),
            &init,
            &setting,
        )
        .unwrap();
        assert_eq!(result.trajectory.first().conf, start);
        assert_eq!(result.trajectory.last().conf, end);
        assert_eq!(result.trajectory.last().vel, DVector::zeros(2));
    }

    #[test]
    fn test_mismatched_warm_start() {
        let setting = TrajOptimizerSetting::new(SettingParams::new(2).with_total_step(4)).unwrap();
        let init = init_arm_traj_straight_line(&v(0.0, 0.0), &v(1.0, 0.0), 3, 1.0).unwrap();
        let err = batch_traj_optimize_2d_point_robot(
            point_robot(),
            disc_field(),
            &v(0.0, 0.0),
            &v(0.0, 0.0),
            &v(1.0, 0.0),
            &v(0.0, 0.0),
            &init,
            &setting,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::PlannerError::InvalidInput(_)));
    }
}
