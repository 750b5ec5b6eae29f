//! Shared fixtures for planning integration tests
//!
//! The reference scene is a 2-link planar arm (both links 0.5 m) whose body
//! is approximated by five 5 cm spheres per link, and a 3 x 3 m field centred
//! on the arm base.

#![allow(dead_code)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use gpmp_solver::kinematics::{Arm, ArmModel, BodySphere, ForwardKinematics, RobotModel};
use gpmp_solver::obstacle::{DistanceField, PlanarSdf};
use gpmp_solver::optimizer::OptimizerType;
use gpmp_solver::planner::{SettingParams, TrajOptimizerSetting, Trajectory};
use nalgebra::{DMatrix, DVector, Vector2, Vector3};

pub const SPHERE_RADIUS: f64 = 0.05;

pub fn dvec(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

pub fn planar_arm() -> Arc<ArmModel> {
    let arm = Arm::new(2, dvec(&[0.5, 0.5]), dvec(&[0.0, 0.0]), dvec(&[0.0, 0.0])).expect("valid DH parameters");
    let mut spheres = Vec::new();
    for link in 0..2 {
        for k in 0..5 {
            let x = -0.5 + 0.125 * k as f64;
            spheres.push(BodySphere::new(link, SPHERE_RADIUS, Vector3::new(x, 0.0, 0.0)));
        }
    }
    Arc::new(ArmModel::new(arm, spheres).expect("valid body spheres"))
}

/// Field sampled from an analytic distance function on a 301 x 301 grid.
pub fn planar_field(distance: impl Fn(Vector2<f64>) -> f64) -> Arc<PlanarSdf> {
    let origin = Vector2::new(-1.5, -1.5);
    let cell = 0.01;
    let data = DMatrix::from_fn(301, 301, |r, c| distance(origin + Vector2::new(c as f64, r as f64) * cell));
    Arc::new(PlanarSdf::new(origin, cell, data).expect("valid grid"))
}

/// Nothing within reach of the arm.
pub fn free_field() -> Arc<PlanarSdf> {
    planar_field(|_| 10.0)
}

/// Centre of the disc obstacle: radius 0.95 from the base, 40.5 degrees up.
pub fn obstacle_center() -> Vector2<f64> {
    let angle = 40.5_f64.to_radians();
    Vector2::new(0.95 * angle.cos(), 0.95 * angle.sin())
}

/// One disc of radius 0.05 in the sweep of the straight-line motion.
pub fn disc_field() -> Arc<PlanarSdf> {
    let center = obstacle_center();
    planar_field(move |p| (p - center).norm() - 0.05)
}

pub fn arm_setting(optimizer: OptimizerType) -> TrajOptimizerSetting {
    TrajOptimizerSetting::new(
        SettingParams::new(2)
            .with_total_step(10)
            .with_total_time(10.0)
            .with_epsilon(0.05)
            .with_cost_sigma(0.01)
            .with_obs_check_inter(5)
            .with_rel_thresh(1e-4)
            .with_max_iter(100)
            .with_optimizer_type(optimizer),
    )
    .expect("valid setting")
}

/// Smallest `distance - radius` over every body sphere of every state.
pub fn min_clearance<FK: ForwardKinematics, F: DistanceField>(
    robot: &RobotModel<FK>,
    field: &F,
    traj: &Trajectory,
) -> f64 {
    traj.confs()
        .flat_map(|conf| {
            let centers = robot.sphere_centers(conf).expect("conf matches robot");
            centers
                .into_iter()
                .zip(robot.body_spheres())
                .map(|(c, s)| field.distance(&c) - s.radius)
                .collect::<Vec<_>>()
        })
        .fold(f64::INFINITY, f64::min)
}

pub fn assert_vec_near(actual: &DVector<f64>, expected: &DVector<f64>, tol: f64) {
    assert_eq!(actual.len(), expected.len());
    let err = (actual - expected).amax();
    assert!(err <= tol, "{actual} differs from {expected} by {err:e} (tol {tol:e})");
}
