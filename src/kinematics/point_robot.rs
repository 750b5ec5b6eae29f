//! Holonomic point robot.
//!
//! The configuration is the position itself (x, y for a planar robot, x, y, z in
//! space). Every link shares that position with identity orientation, so a
//! robot body can be approximated by several spheres placed around it.

use nalgebra::{DVector, Isometry3, Matrix6xX, Translation3, UnitQuaternion, Vector3};

use super::{ForwardKinematics, KinematicsError, KinematicsResult};

#[derive(Debug, Clone)]
pub struct PointRobot {
    dof: usize,
    nr_links: usize,
}

impl PointRobot {
    /// # Errors
    /// `InvalidParameters` unless `dof` is 2 or 3 and there is at least one link.
    pub fn new(dof: usize, nr_links: usize) -> KinematicsResult<Self> {
        if !(2..=3).contains(&dof) {
            return Err(KinematicsError::InvalidParameters(format!(
                "point robot must be planar or spatial, got dof {dof}"
            )));
        }
        if nr_links == 0 {
            return Err(KinematicsError::InvalidParameters(
                "point robot needs at least one link".to_string(),
            ));
        }
        Ok(Self { dof, nr_links })
    }

    fn position(&self, conf: &DVector<f64>) -> Vector3<f64> {
        let z = if self.dof == 3 { conf[2] } else { 0.0 };
        Vector3::new(conf[0], conf[1], z)
    }
}

impl ForwardKinematics for PointRobot {
    fn dof(&self) -> usize {
        self.dof
    }

    fn nr_links(&self) -> usize {
        self.nr_links
    }

    fn link_poses_with_jacobians(
        &self,
        conf: &DVector<f64>,
    ) -> KinematicsResult<(Vec<Isometry3<f64>>, Vec<Matrix6xX<f64>>)> {
        self.check_dimension(conf)?;
        let pose = Isometry3::from_parts(
            Translation3::from(self.position(conf)),
            UnitQuaternion::identity(),
        );
        let mut jacobian = Matrix6xX::zeros(self.dof);
        for i in 0..self.dof {
            jacobian[(i, i)] = 1.0;
        }
        Ok((
            vec![pose; self.nr_links],
            vec![jacobian; self.nr_links],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_point_robot() {
        let robot = PointRobot::new(2, 1).unwrap();
        let conf = DVector::from_vec(vec![1.5, -2.0]);
        let pos = robot.forward_kinematics_position(&conf).unwrap();
        assert_eq!(pos.column(0), Vector3::new(1.5, -2.0, 0.0));

        let vel = robot
            .forward_kinematics_vel(&conf, &DVector::from_vec(vec![0.3, 0.4]))
            .unwrap();
        assert!((vel[(0, 0)] - 0.3).abs() < 1e-12);
        assert!((vel[(1, 0)] - 0.4).abs() < 1e-12);
        assert!(vel.fixed_view::<4, 1>(2, 0).norm() < 1e-12);
    }

    #[test]
    fn test_spatial_point_robot_links() {
        let robot = PointRobot::new(3, 2).unwrap();
        let poses = robot
            .link_poses(&DVector::from_vec(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[1].translation.vector, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_invalid_dof() {
        assert!(PointRobot::new(4, 1).is_err());
        assert!(PointRobot::new(2, 0).is_err());
    }
}
