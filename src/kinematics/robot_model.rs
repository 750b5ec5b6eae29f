//! Collision geometry: body spheres rigidly attached to robot links.

use nalgebra::{DVector, Matrix3xX, Vector3};

use super::{Arm, ForwardKinematics, KinematicsError, KinematicsResult, PointRobot, point_jacobian};

/// Sphere attached to a link, `center` expressed in that link's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySphere {
    pub link_id: usize,
    pub radius: f64,
    pub center: Vector3<f64>,
}

impl BodySphere {
    pub fn new(link_id: usize, radius: f64, center: Vector3<f64>) -> Self {
        Self {
            link_id,
            radius,
            center,
        }
    }
}

/// Forward kinematics model plus its body spheres.
#[derive(Debug, Clone)]
pub struct RobotModel<FK: ForwardKinematics> {
    fk_model: FK,
    spheres: Vec<BodySphere>,
}

/// Arm with collision spheres
pub type ArmModel = RobotModel<Arm>;

/// Point robot with collision spheres
pub type PointRobotModel = RobotModel<PointRobot>;

impl<FK: ForwardKinematics> RobotModel<FK> {
    /// # Errors
    /// `InvalidBodySphere` when a sphere references a missing link or has a
    /// negative/non-finite radius.
    pub fn new(fk_model: FK, spheres: Vec<BodySphere>) -> KinematicsResult<Self> {
        for (i, sphere) in spheres.iter().enumerate() {
            if sphere.link_id >= fk_model.nr_links() {
                return Err(KinematicsError::InvalidBodySphere(format!(
                    "sphere {i} is attached to link {} but the robot has {} links",
                    sphere.link_id,
                    fk_model.nr_links()
                )));
            }
            if !sphere.radius.is_finite() || sphere.radius < 0.0 {
                return Err(KinematicsError::InvalidBodySphere(format!(
                    "sphere {i} has invalid radius {}",
                    sphere.radius
                )));
            }
        }
        Ok(Self { fk_model, spheres })
    }

    pub fn fk_model(&self) -> &FK {
        &self.fk_model
    }

    pub fn dof(&self) -> usize {
        self.fk_model.dof()
    }

    pub fn nr_body_spheres(&self) -> usize {
        self.spheres.len()
    }

    pub fn body_spheres(&self) -> &[BodySphere] {
        &self.spheres
    }

    pub fn sphere_radius(&self, index: usize) -> KinematicsResult<f64> {
        self.spheres
            .get(index)
            .map(|s| s.radius)
            .ok_or(KinematicsError::SphereIndexOutOfRange {
                index,
                count: self.spheres.len(),
            })
    }

    /// World positions of all sphere centers.
    pub fn sphere_centers(&self, conf: &DVector<f64>) -> KinematicsResult<Vec<Vector3<f64>>> {
        let poses = self.fk_model.link_poses(conf)?;
        Ok(self
            .spheres
            .iter()
            .map(|s| (poses[s.link_id] * nalgebra::Point3::from(s.center)).coords)
            .collect())
    }

    /// Sphere centers and their 3 x DOF Jacobians with respect to the configuration.
    pub fn sphere_centers_with_jacobians(
        &self,
        conf: &DVector<f64>,
    ) -> KinematicsResult<(Vec<Vector3<f64>>, Vec<Matrix3xX<f64>>)> {
        let (poses, link_jacobians) = self.fk_model.link_poses_with_jacobians(conf)?;
        let mut centers = Vec::with_capacity(self.spheres.len());
        let mut jacobians = Vec::with_capacity(self.spheres.len());
        for sphere in &self.spheres {
            let pose = &poses[sphere.link_id];
            let offset = pose.rotation * sphere.center;
            centers.push(pose.translation.vector + offset);
            jacobians.push(point_jacobian(&link_jacobians[sphere.link_id], &offset));
        }
        Ok((centers, jacobians))
    }

    /// Sphere centers as a 3 x nr_body_spheres matrix
    pub fn sphere_centers_mat(&self, conf: &DVector<f64>) -> KinematicsResult<Matrix3xX<f64>> {
        let centers = self.sphere_centers(conf)?;
        Ok(Matrix3xX::from_columns(&centers))
    }

    /// Center of a single sphere
    pub fn sphere_center(&self, index: usize, conf: &DVector<f64>) -> KinematicsResult<Vector3<f64>> {
        let sphere = self
            .spheres
            .get(index)
            .ok_or(KinematicsError::SphereIndexOutOfRange {
                index,
                count: self.spheres.len(),
            })?;
        let poses = self.fk_model.link_poses(conf)?;
        Ok((poses[sphere.link_id] * nalgebra::Point3::from(sphere.center)).coords)
    }
}
