//! Jacobian checks for every factor against central finite differences.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Vector2, Vector3};

use super::*;
use crate::kinematics::{Arm, ArmModel, BodySphere, PointRobot, PointRobotModel};
use crate::obstacle::PlanarSdf;

const STEP: f64 = 1e-6;
const TOLERANCE: f64 = 1e-4;

fn numeric_jacobian(factor: &dyn Factor, params: &[DVector<f64>]) -> DMatrix<f64> {
    let total: usize = params.iter().map(|p| p.len()).sum();
    let mut jacobian = DMatrix::zeros(factor.get_dimension(), total);
    let mut col = 0;
    for (block, param) in params.iter().enumerate() {
        for i in 0..param.len() {
            let mut plus = params.to_vec();
            let mut minus = params.to_vec();
            plus[block][i] += STEP;
            minus[block][i] -= STEP;
            let r_plus = factor.linearize(&plus, false).unwrap().0;
            let r_minus = factor.linearize(&minus, false).unwrap().0;
            jacobian.set_column(col, &((r_plus - r_minus) / (2.0 * STEP)));
            col += 1;
        }
    }
    jacobian
}

fn assert_jacobian_matches(factor: &dyn Factor, params: &[DVector<f64>]) {
    let (residual, analytic) = factor.linearize(params, true).unwrap();
    assert_eq!(residual.len(), factor.get_dimension());
    let analytic = analytic.unwrap();
    let numeric = numeric_jacobian(factor, params);
    assert_eq!(analytic.shape(), numeric.shape());
    let diff = (&analytic - &numeric).abs().max();
    assert!(
        diff < TOLERANCE * (1.0 + numeric.abs().max()),
        "{} jacobian mismatch {diff}\nanalytic {analytic}\nnumeric {numeric}",
        factor.kind()
    );
}

fn vec(values: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(values)
}

/// Obstacle occupying `x > 0.6`; the field is linear so bilinear lookup is exact.
fn wall_field() -> Arc<PlanarSdf> {
    let cell = 0.05;
    let origin = Vector2::new(-1.0, -1.0);
    let data = DMatrix::from_fn(60, 60, |_, c| 0.6 - (origin.x + c as f64 * cell));
    Arc::new(PlanarSdf::new(origin, cell, data).unwrap())
}

fn planar_arm() -> Arc<ArmModel> {
    let arm = Arm::new(2, vec(&[0.5, 0.5]), vec(&[0.0, 0.0]), vec(&[0.0, 0.0])).unwrap();
    let mut spheres = Vec::new();
    for link in 0..2 {
        for k in 0..5 {
            let x = -0.5 + 0.125 * k as f64;
            spheres.push(BodySphere::new(link, 0.05, Vector3::new(x, 0.0, 0.0)));
        }
    }
    Arc::new(ArmModel::new(arm, spheres).unwrap())
}

fn point_robot() -> Arc<PointRobotModel> {
    let robot = PointRobot::new(2, 1).unwrap();
    Arc::new(PointRobotModel::new(robot, vec![BodySphere::new(0, 0.1, Vector3::zeros())]).unwrap())
}

// ============================================================================
// Priors
// ============================================================================

#[test]
fn test_prior_factor_jacobian() {
    let noise = GaussianNoise::diagonal(&vec(&[0.1, 0.5, 2.0])).unwrap();
    let factor = PriorFactor::new(vec(&[1.0, -1.0, 0.5]), noise).unwrap();
    assert_jacobian_matches(&factor, &[vec(&[0.3, 0.2, -0.4])]);
    let (r, _) = factor.linearize(&[vec(&[1.0, -1.0, 0.5])], false).unwrap();
    assert!(r.norm() < 1e-12);
}

#[test]
fn test_prior_factor_dimension_mismatch() {
    let factor = PriorFactor::new(vec(&[1.0, 2.0]), GaussianNoise::unit(2)).unwrap();
    assert!(matches!(
        factor.linearize(&[vec(&[1.0])], true),
        Err(FactorError::InvalidDimension { expected: 2, actual: 1 })
    ));
    assert!(matches!(
        factor.linearize(&[vec(&[1.0, 2.0]), vec(&[1.0, 2.0])], true),
        Err(FactorError::ParameterCount { expected: 1, actual: 2 })
    ));
}

#[test]
fn test_gp_prior_zero_on_constant_velocity() {
    let qc = DMatrix::identity(2, 2);
    let factor = GaussianProcessPriorFactor::new(&qc, 0.5).unwrap();
    let q1 = vec(&[0.0, 1.0]);
    let v = vec(&[0.4, -0.2]);
    let q2 = &q1 + &v * 0.5;
    let (r, _) = factor.linearize(&[q1, v.clone(), q2, v], false).unwrap();
    assert!(r.norm() < 1e-9);
}

#[test]
fn test_gp_prior_jacobian() {
    let qc = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 0.5]);
    let factor = GaussianProcessPriorFactor::new(&qc, 0.3).unwrap();
    let params = [vec(&[0.1, 0.2]), vec(&[1.0, -0.5]), vec(&[0.6, 0.1]), vec(&[0.7, 0.0])];
    assert_jacobian_matches(&factor, &params);
}

#[test]
fn test_gp_prior_rejects_bad_inputs() {
    let qc = DMatrix::identity(2, 2);
    assert!(GaussianProcessPriorFactor::new(&qc, 0.0).is_err());
    assert!(GaussianProcessPriorFactor::new(&DMatrix::zeros(2, 2), 1.0).is_err());
}

// ============================================================================
// Obstacle costs
// ============================================================================

#[test]
fn test_obstacle_factor_zero_when_safe() {
    let factor = ObstaclePlanarSdfFactorArm::new(planar_arm(), wall_field(), 0.1, 0.1).unwrap();
    // arm folded back toward negative x, far from the wall
    let (r, j) = factor.linearize(&[vec(&[std::f64::consts::PI, 0.0])], true).unwrap();
    assert_eq!(r.len(), 10);
    assert!(r.norm() < 1e-12);
    assert!(j.unwrap().norm() < 1e-12);
}

#[test]
fn test_obstacle_factor_jacobian_arm() {
    let factor = ObstaclePlanarSdfFactorArm::new(planar_arm(), wall_field(), 0.1, 0.1).unwrap();
    let conf = vec(&[0.3, 0.2]);
    let error = factor.evaluate_error(&conf).unwrap();
    // link tip and the whole second link reach into the wall
    assert!(error[4] > 0.0 && error[9] > error[5]);
    assert_eq!(error[0], 0.0);
    assert_jacobian_matches(&factor, &[conf]);
}

#[test]
fn test_obstacle_factor_jacobian_point_robot() {
    let factor =
        ObstaclePlanarSdfFactorPointRobot::new(point_robot(), wall_field(), 0.2, 0.1).unwrap();
    let conf = vec(&[0.55, 0.3]);
    let (r, _) = factor.linearize(&[conf.clone()], false).unwrap();
    // sdf 0.05, threshold 0.2, whitened by 0.2
    assert!((r[0] - 0.15 / 0.2).abs() < 1e-9);
    assert_jacobian_matches(&factor, &[conf]);
}

#[test]
fn test_obstacle_factor_rejects_negative_epsilon() {
    assert!(ObstaclePlanarSdfFactorArm::new(planar_arm(), wall_field(), 0.1, -0.1).is_err());
}

#[test]
fn test_interpolated_obstacle_factor_jacobian() {
    let qc = DMatrix::identity(2, 2);
    let factor = ObstaclePlanarSdfFactorGpArm::with_check_points(
        planar_arm(),
        wall_field(),
        0.1,
        0.1,
        &qc,
        0.5,
        2,
    )
    .unwrap();
    assert_eq!(factor.get_dimension(), 20);
    assert_eq!(factor.taus().len(), 2);
    let params = [vec(&[0.3, 0.2]), vec(&[0.1, -0.1]), vec(&[0.4, 0.1]), vec(&[0.05, 0.05])];
    assert_jacobian_matches(&factor, &params);
}

#[test]
fn test_interpolated_obstacle_matches_unary_at_interpolated_conf() {
    let qc = DMatrix::identity(2, 2);
    let robot = planar_arm();
    let field = wall_field();
    let gp = ObstaclePlanarSdfFactorGpArm::new(
        robot.clone(),
        field.clone(),
        0.1,
        0.1,
        &qc,
        0.5,
        &[0.2],
    )
    .unwrap();
    let unary = ObstaclePlanarSdfFactorArm::new(robot, field, 0.1, 0.1).unwrap();

    let (q1, v1, q2, v2) = (vec(&[0.3, 0.2]), vec(&[0.1, -0.1]), vec(&[0.4, 0.1]), vec(&[0.05, 0.05]));
    let interpolator = crate::gp::GaussianProcessInterpolator::new(&qc, 0.5, 0.2).unwrap();
    let conf = interpolator.interpolate_pose(&q1, &v1, &q2, &v2).unwrap();

    let (r_gp, _) = gp.linearize(&[q1, v1, q2, v2], false).unwrap();
    let (r_unary, _) = unary.linearize(&[conf], false).unwrap();
    assert!((r_gp - r_unary).norm() < 1e-12);
}

#[test]
fn test_interpolated_obstacle_needs_check_points() {
    let qc = DMatrix::identity(2, 2);
    assert!(
        ObstaclePlanarSdfFactorGpArm::with_check_points(planar_arm(), wall_field(), 0.1, 0.1, &qc, 0.5, 0)
            .is_err()
    );
    let qc3 = DMatrix::identity(3, 3);
    assert!(
        ObstaclePlanarSdfFactorGpArm::new(planar_arm(), wall_field(), 0.1, 0.1, &qc3, 0.5, &[0.1])
            .is_err()
    );
}

// ============================================================================
// Goal and limits
// ============================================================================

#[test]
fn test_goal_factor_jacobian() {
    let arm = Arm::new(2, vec(&[0.5, 0.5]), vec(&[0.0, 0.0]), vec(&[0.0, 0.0])).unwrap();
    let factor = GoalFactor::new(
        Arc::new(arm),
        Vector3::new(0.0, 1.0, 0.0),
        GaussianNoise::isotropic(3, 0.1).unwrap(),
    )
    .unwrap();
    assert_jacobian_matches(&factor, &[vec(&[0.4, -0.7])]);

    // fully stretched along +y reaches the destination
    let (r, _) = factor
        .linearize(&[vec(&[std::f64::consts::FRAC_PI_2, 0.0])], false)
        .unwrap();
    assert!(r.norm() < 1e-9);
}

#[test]
fn test_hinge_loss_limit_cost() {
    assert_eq!(hinge_loss_limit_cost(0.0, -1.0, 1.0, 0.1), (0.0, 0.0));
    let (cost, slope) = hinge_loss_limit_cost(-0.95, -1.0, 1.0, 0.1);
    assert!((cost - 0.05).abs() < 1e-12);
    assert_eq!(slope, -1.0);
    let (cost, slope) = hinge_loss_limit_cost(1.2, -1.0, 1.0, 0.1);
    assert!((cost - 0.3).abs() < 1e-12);
    assert_eq!(slope, 1.0);
}

#[test]
fn test_joint_limit_factor_jacobian() {
    let factor = JointLimitFactor::new(
        vec(&[-1.0, -1.0, -1.0]),
        vec(&[1.0, 1.0, 1.0]),
        vec(&[0.1, 0.1, 0.1]),
        GaussianNoise::isotropic(3, 0.01).unwrap(),
    )
    .unwrap();
    assert_eq!(factor.kind(), FactorKind::JointLimit);
    assert_jacobian_matches(&factor, &[vec(&[-0.97, 0.2, 1.3])]);
}

#[test]
fn test_velocity_limit_factor() {
    let factor = VelocityLimitFactor::new(
        vec(&[2.0, 2.0]),
        vec(&[0.0, 0.0]),
        GaussianNoise::unit(2),
    )
    .unwrap();
    let (r, _) = factor.linearize(&[vec(&[-2.5, 1.0])], false).unwrap();
    assert!((r - vec(&[0.5, 0.0])).norm() < 1e-12);
    assert_jacobian_matches(&factor, &[vec(&[-2.5, 2.3])]);
    assert!(VelocityLimitFactor::new(vec(&[-1.0]), vec(&[0.0]), GaussianNoise::unit(1)).is_err());
}

#[test]
fn test_factor_kinds() {
    assert!(FactorKind::Obstacle.is_collision());
    assert!(FactorKind::InterpolatedObstacle.is_collision());
    assert!(!FactorKind::GaussianProcessPrior.is_collision());
    assert_eq!(FactorKind::InterpolatedObstacle.to_string(), "gp-obstacle");
}
