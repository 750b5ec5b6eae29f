//! Forward kinematics and collision geometry of planning robots.
//!
//! A robot is described by a [`ForwardKinematics`] model that maps a
//! configuration vector to a pose per link, together with the geometric
//! Jacobian of every link. Collision geometry lives in [`RobotModel`], which
//! attaches body spheres to links.
//!
//! Two models are provided:
//! - [`Arm`]: serial revolute manipulator described by Denavit-Hartenberg parameters
//! - [`PointRobot`]: holonomic point robot in the plane or in space

use nalgebra::{DVector, Isometry3, Matrix3xX, Matrix6xX, Vector3, Vector6};
use thiserror::Error;
use tracing::error;

pub mod arm;
pub mod point_robot;
pub mod robot_model;

pub use arm::Arm;
pub use point_robot::PointRobot;
pub use robot_model::{ArmModel, BodySphere, PointRobotModel, RobotModel};

/// Kinematics-specific error types
#[derive(Debug, Clone, Error)]
pub enum KinematicsError {
    /// Configuration or velocity vector does not match the robot DOF
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid robot description (DH parameter lengths, unsupported DOF, ...)
    #[error("Invalid robot parameters: {0}")]
    InvalidParameters(String),

    /// Body sphere attached to a missing link or with a negative radius
    #[error("Invalid body sphere: {0}")]
    InvalidBodySphere(String),

    /// Body sphere index past the number of spheres
    #[error("Sphere index {index} out of range ({count} spheres)")]
    SphereIndexOutOfRange { index: usize, count: usize },
}

impl KinematicsError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for kinematics operations
pub type KinematicsResult<T> = Result<T, KinematicsError>;

/// Forward kinematics of a robot with `dof` joints and `nr_links` links.
///
/// Implementors provide link poses in the world frame and, per link, the 6 x DOF
/// geometric Jacobian. Rows 0..3 are the linear velocity of the link frame
/// origin and rows 3..6 the angular velocity, both in world coordinates.
pub trait ForwardKinematics: Send + Sync + std::fmt::Debug {
    /// Number of joints (configuration dimension)
    fn dof(&self) -> usize;

    /// Number of links with a pose
    fn nr_links(&self) -> usize;

    /// Link poses together with each link's geometric Jacobian
    fn link_poses_with_jacobians(
        &self,
        conf: &DVector<f64>,
    ) -> KinematicsResult<(Vec<Isometry3<f64>>, Vec<Matrix6xX<f64>>)>;

    /// Link poses only
    fn link_poses(&self, conf: &DVector<f64>) -> KinematicsResult<Vec<Isometry3<f64>>> {
        Ok(self.link_poses_with_jacobians(conf)?.0)
    }

    /// Fail fast when a vector does not have exactly `dof` entries
    fn check_dimension(&self, vector: &DVector<f64>) -> KinematicsResult<()> {
        if vector.len() != self.dof() {
            return Err(KinematicsError::DimensionMismatch {
                expected: self.dof(),
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Link poses as a 6 x nr_links matrix, one `[yaw, pitch, roll, x, y, z]` column per link
    fn forward_kinematics_pose(&self, conf: &DVector<f64>) -> KinematicsResult<Matrix6xX<f64>> {
        let poses = self.link_poses(conf)?;
        let mut out = Matrix6xX::zeros(poses.len());
        for (i, pose) in poses.iter().enumerate() {
            let (roll, pitch, yaw) = pose.rotation.euler_angles();
            let t = pose.translation.vector;
            out.set_column(i, &Vector6::new(yaw, pitch, roll, t.x, t.y, t.z));
        }
        Ok(out)
    }

    /// Link origins as a 3 x nr_links matrix
    fn forward_kinematics_position(
        &self,
        conf: &DVector<f64>,
    ) -> KinematicsResult<Matrix3xX<f64>> {
        let poses = self.link_poses(conf)?;
        let mut out = Matrix3xX::zeros(poses.len());
        for (i, pose) in poses.iter().enumerate() {
            out.set_column(i, &pose.translation.vector);
        }
        Ok(out)
    }

    /// Link spatial velocities as a 6 x nr_links matrix, `[vx, vy, vz, wx, wy, wz]` per link
    fn forward_kinematics_vel(
        &self,
        conf: &DVector<f64>,
        vel: &DVector<f64>,
    ) -> KinematicsResult<Matrix6xX<f64>> {
        self.check_dimension(vel)?;
        let (_, jacobians) = self.link_poses_with_jacobians(conf)?;
        let mut out = Matrix6xX::zeros(jacobians.len());
        for (i, jacobian) in jacobians.iter().enumerate() {
            out.set_column(i, &(jacobian * vel));
        }
        Ok(out)
    }
}

/// Jacobian of a point rigidly attached to a link, from the link's geometric Jacobian.
///
/// `offset_world` is the vector from the link origin to the point, in world coordinates.
pub fn point_jacobian(link_jacobian: &Matrix6xX<f64>, offset_world: &Vector3<f64>) -> Matrix3xX<f64> {
    let linear = link_jacobian.fixed_rows::<3>(0);
    let angular = link_jacobian.fixed_rows::<3>(3);
    linear - offset_world.cross_matrix() * angular
}
