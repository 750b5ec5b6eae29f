//! Trajectory initialization, densification and evaluation helpers.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::graph::TrajectoryGraph;
use super::setting::TrajOptimizerSetting;
use super::trajectory::{Trajectory, TrajectoryState};
use crate::error::{PlannerError, PlannerResult};
use crate::gp::GaussianProcessInterpolator;
use crate::kinematics::{ForwardKinematics, RobotModel};
use crate::obstacle::DistanceField;

/// Straight line in configuration space with constant velocity `(end - init) / total_time`.
///
/// # Errors
/// `InvalidInput` for mismatched configuration sizes, `total_step == 0` or a
/// non-positive `total_time`.
pub fn init_arm_traj_straight_line(
    init_conf: &DVector<f64>,
    end_conf: &DVector<f64>,
    total_step: usize,
    total_time: f64,
) -> PlannerResult<Trajectory> {
    if init_conf.len() != end_conf.len() {
        return Err(PlannerError::InvalidInput(format!(
            "start has {} joints, end has {}",
            init_conf.len(),
            end_conf.len()
        )));
    }
    if total_step == 0 {
        return Err(PlannerError::InvalidInput(
            "total_step must be at least 1".to_string(),
        ));
    }
    if !(total_time.is_finite() && total_time > 0.0) {
        return Err(PlannerError::InvalidInput(format!(
            "total_time must be positive, got {total_time}"
        )));
    }

    let delta = end_conf - init_conf;
    let vel = &delta / total_time;
    let states = (0..=total_step)
        .map(|i| {
            let ratio = i as f64 / total_step as f64;
            TrajectoryState::new(init_conf + &delta * ratio, vel.clone())
        })
        .collect();
    Trajectory::new(total_time / total_step as f64, states)
}

/// Densify a trajectory with `inter_step` GP-interpolated states per interval.
///
/// The result has `total_step * (inter_step + 1) + 1` states, keeps every
/// original state, and a time step of `delta_t / (inter_step + 1)`.
pub fn interpolate_arm_traj(
    traj: &Trajectory,
    qc: &DMatrix<f64>,
    inter_step: usize,
) -> PlannerResult<Trajectory> {
    if inter_step == 0 {
        return Ok(traj.clone());
    }
    let delta_t = traj.delta_t();
    let sub_dt = delta_t / (inter_step + 1) as f64;
    let interpolators = (1..=inter_step)
        .map(|j| GaussianProcessInterpolator::new(qc, delta_t, j as f64 * sub_dt))
        .collect::<Result<Vec<_>, _>>()?;

    let dof = traj.dof();
    let mut states = Vec::with_capacity(traj.total_step() * (inter_step + 1) + 1);
    for pair in traj.states().windows(2) {
        let (s1, s2) = (&pair[0], &pair[1]);
        states.push(s1.clone());
        for interpolator in &interpolators {
            let x = interpolator.interpolate_state(&s1.conf, &s1.vel, &s2.conf, &s2.vel)?;
            states.push(TrajectoryState::new(
                x.rows(0, dof).into_owned(),
                x.rows(dof, dof).into_owned(),
            ));
        }
    }
    states.push(traj.last().clone());
    Trajectory::new(sub_dt, states)
}

/// Total collision cost of a trajectory under the setting's obstacle factors.
///
/// Uses the unary factor at every state and, with `obs_check_inter > 0`, the
/// interpolated factor on every interval, so the value matches the collision
/// part of the planning objective.
pub fn collision_cost<FK, F>(
    robot: Arc<RobotModel<FK>>,
    field: Arc<F>,
    traj: &Trajectory,
    setting: &TrajOptimizerSetting,
) -> PlannerResult<f64>
where
    FK: ForwardKinematics + 'static,
    F: DistanceField + 'static,
{
    let graph = TrajectoryGraph::new(robot, field, setting.clone())?;
    graph.check_trajectory(traj)?;
    let problem = graph.collision_problem(traj.total_step());
    Ok(problem.compute_cost(&traj.to_values())?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::kinematics::{BodySphere, PointRobot, PointRobotModel};
    use crate::obstacle::PlanarSdf;
    use crate::planner::setting::SettingParams;
    use nalgebra::{Vector2, Vector3};

    fn assert_vec_close(a: &DVector<f64>, b: &DVector<f64>, tol: f64) {
        assert_eq!(a.len(), b.len());
        assert!((a - b).amax() < tol, "{a} != {b}");
    }

    #[test]
    fn test_straight_line() {
        let start = DVector::from_vec(vec![0.0, 1.0]);
        let end = DVector::from_vec(vec![2.0, -1.0]);
        let traj = init_arm_traj_straight_line(&start, &end, 4, 2.0).unwrap();
        assert_eq!(traj.len(), 5);
        assert!((traj.delta_t() - 0.5).abs() < 1e-12);
        assert_vec_close(&traj.first().conf, &start, 1e-12);
        assert_vec_close(&traj.last().conf, &end, 1e-12);
        assert_vec_close(&traj.state(2).unwrap().conf, &DVector::from_vec(vec![1.0, 0.0]), 1e-12);
        for state in traj.states() {
            assert_vec_close(&state.vel, &DVector::from_vec(vec![1.0, -1.0]), 1e-12);
        }
        assert!(init_arm_traj_straight_line(&start, &DVector::zeros(3), 4, 1.0).is_err());
        assert!(init_arm_traj_straight_line(&start, &end, 0, 1.0).is_err());
    }

    #[test]
    fn test_interpolate_zero_is_identity() {
        let traj = init_arm_traj_straight_line(&DVector::zeros(2), &DVector::from_element(2, 1.0), 3, 1.0).unwrap();
        let same = interpolate_arm_traj(&traj, &DMatrix::identity(2, 2), 0).unwrap();
        assert_eq!(same, traj);
    }

    #[test]
    fn test_interpolate_constant_velocity_stays_on_line() {
        let start = DVector::from_vec(vec![0.0, 0.0]);
        let end = DVector::from_vec(vec![1.0, 2.0]);
        let traj = init_arm_traj_straight_line(&start, &end, 2, 1.0).unwrap();
        let dense = interpolate_arm_traj(&traj, &DMatrix::identity(2, 2), 3).unwrap();
        assert_eq!(dense.len(), 2 * 4 + 1);
        assert!((dense.delta_t() - 0.125).abs() < 1e-12);
        // original states are kept
        assert_eq!(dense.state(4).unwrap(), traj.state(1).unwrap());
        for (k, state) in dense.states().iter().enumerate() {
            let expected = &end * (k as f64 / 8.0);
            assert_vec_close(&state.conf, &expected, 1e-9);
            assert_vec_close(&state.vel, &end, 1e-9);
        }
    }

    #[test]
    fn test_collision_cost() {
        let robot = Arc::new(
            PointRobotModel::new(
                PointRobot::new(2, 1).unwrap(),
                vec![BodySphere::new(0, 0.1, Vector3::zeros())],
            )
            .unwrap(),
        );
        // distance to the plane x = 0.5, free on the left
        let data = DMatrix::from_fn(21, 21, |_, c| 0.5 - (-1.0 + 0.1 * c as f64));
        let field = Arc::new(PlanarSdf::new(Vector2::new(-1.0, -1.0), 0.1, data).unwrap());
        let setting = TrajOptimizerSetting::new(
            SettingParams::new(2).with_total_step(2).with_epsilon(0.1),
        )
        .unwrap();

        let free = init_arm_traj_straight_line(
            &DVector::from_vec(vec![-0.8, -0.5]),
            &DVector::from_vec(vec![-0.8, 0.5]),
            2,
            1.0,
        )
        .unwrap();
        let cost = collision_cost(robot.clone(), field.clone(), &free, &setting).unwrap();
        assert!(cost.abs() < 1e-12);

        let hit = init_arm_traj_straight_line(
            &DVector::from_vec(vec![-0.8, 0.0]),
            &DVector::from_vec(vec![0.8, 0.0]),
            2,
            1.0,
        )
        .unwrap();
        let cost = collision_cost(robot.clone(), field.clone(), &hit, &setting).unwrap();
        assert!(cost > 0.0);

        let short = init_arm_traj_straight_line(&DVector::zeros(2), &DVector::zeros(2), 3, 1.0).unwrap();
        assert!(collision_cost(robot, field, &short, &setting).is_err());
    }
}
