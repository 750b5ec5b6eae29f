//! Serial revolute arm described by Denavit-Hartenberg parameters.
//!
//! Joint `i` contributes the transform `Rz(theta_i + bias_i) * Tz(d_i) * Tx(a_i) * Rx(alpha_i)`.
//! Link `i` is the frame reached after joint `i`, so link poses are
//! `base * T_0 * ... * T_i`.

use nalgebra::{DVector, Isometry3, Matrix6xX, Translation3, UnitQuaternion, Vector3};

use super::{ForwardKinematics, KinematicsError, KinematicsResult};

/// DH arm with an optional base pose and per-joint angle bias.
#[derive(Debug, Clone)]
pub struct Arm {
    dof: usize,
    a: DVector<f64>,
    alpha: DVector<f64>,
    d: DVector<f64>,
    base_pose: Isometry3<f64>,
    theta_bias: DVector<f64>,
}

impl Arm {
    /// Create an arm at the world origin with zero joint bias.
    ///
    /// # Errors
    /// `InvalidParameters` when `dof` is zero or a DH vector does not have `dof` entries.
    pub fn new(
        dof: usize,
        a: DVector<f64>,
        alpha: DVector<f64>,
        d: DVector<f64>,
    ) -> KinematicsResult<Self> {
        if dof == 0 {
            return Err(KinematicsError::InvalidParameters(
                "arm needs at least one joint".to_string(),
            ));
        }
        for (name, v) in [("a", &a), ("alpha", &alpha), ("d", &d)] {
            if v.len() != dof {
                return Err(KinematicsError::InvalidParameters(format!(
                    "DH parameter '{name}' has {} entries, arm has {dof} joints",
                    v.len()
                )));
            }
        }
        Ok(Self {
            dof,
            a,
            alpha,
            d,
            base_pose: Isometry3::identity(),
            theta_bias: DVector::zeros(dof),
        })
    }

    /// Place the arm base somewhere other than the world origin.
    pub fn with_base_pose(mut self, base_pose: Isometry3<f64>) -> Self {
        self.base_pose = base_pose;
        self
    }

    /// Offset every joint angle by a constant bias.
    pub fn with_theta_bias(mut self, theta_bias: DVector<f64>) -> KinematicsResult<Self> {
        if theta_bias.len() != self.dof {
            return Err(KinematicsError::DimensionMismatch {
                expected: self.dof,
                actual: theta_bias.len(),
            });
        }
        self.theta_bias = theta_bias;
        Ok(self)
    }

    pub fn a(&self) -> &DVector<f64> {
        &self.a
    }

    pub fn alpha(&self) -> &DVector<f64> {
        &self.alpha
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    pub fn base_pose(&self) -> &Isometry3<f64> {
        &self.base_pose
    }

    pub fn theta_bias(&self) -> &DVector<f64> {
        &self.theta_bias
    }

    /// Homogeneous transform contributed by joint `i` at angle `theta`.
    fn joint_transform(&self, i: usize, theta: f64) -> Isometry3<f64> {
        let theta = theta + self.theta_bias[i];
        let (s, c) = theta.sin_cos();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), theta)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.alpha[i]);
        let translation = Translation3::new(self.a[i] * c, self.a[i] * s, self.d[i]);
        Isometry3::from_parts(translation, rotation)
    }

    /// World frames the joint axes are expressed in: the base frame followed by every link
    /// frame except the last.
    fn chain(&self, conf: &DVector<f64>) -> KinematicsResult<Vec<Isometry3<f64>>> {
        self.check_dimension(conf)?;
        let mut poses = Vec::with_capacity(self.dof);
        let mut current = self.base_pose;
        for i in 0..self.dof {
            current *= self.joint_transform(i, conf[i]);
            poses.push(current);
        }
        Ok(poses)
    }
}

impl ForwardKinematics for Arm {
    fn dof(&self) -> usize {
        self.dof
    }

    fn nr_links(&self) -> usize {
        self.dof
    }

    fn link_poses(&self, conf: &DVector<f64>) -> KinematicsResult<Vec<Isometry3<f64>>> {
        self.chain(conf)
    }

    fn link_poses_with_jacobians(
        &self,
        conf: &DVector<f64>,
    ) -> KinematicsResult<(Vec<Isometry3<f64>>, Vec<Matrix6xX<f64>>)> {
        let poses = self.chain(conf)?;

        // joint j rotates about the z axis of the frame preceding it
        let mut axes = Vec::with_capacity(self.dof);
        let mut origins = Vec::with_capacity(self.dof);
        for j in 0..self.dof {
            let frame = if j == 0 { &self.base_pose } else { &poses[j - 1] };
            axes.push(frame.rotation * Vector3::z());
            origins.push(frame.translation.vector);
        }

        let jacobians = poses
            .iter()
            .enumerate()
            .map(|(link, pose)| {
                let p = pose.translation.vector;
                let mut jacobian = Matrix6xX::zeros(self.dof);
                for j in 0..=link {
                    let linear = axes[j].cross(&(p - origins[j]));
                    jacobian.fixed_view_mut::<3, 1>(0, j).copy_from(&linear);
                    jacobian.fixed_view_mut::<3, 1>(3, j).copy_from(&axes[j]);
                }
                jacobian
            })
            .collect();

        Ok((poses, jacobians))
    }
}
