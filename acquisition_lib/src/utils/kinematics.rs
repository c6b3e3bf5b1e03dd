use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

use crate::error::{AcquisitionError, Result};
use crate::types::{ArmConfig, DHParameter, Pose};

/// Denavit-Hartenberg forward kinematics for one limb.
pub struct ForwardKinematics {
    dh_params: Vec<DHParameter>,
    base_offset: Vector3<f64>,
}

impl ForwardKinematics {
    pub fn new(config: &ArmConfig) -> Self {
        Self {
            dh_params: config.dh_parameters.clone(),
            base_offset: Vector3::new(
                config.base_offset[0],
                config.base_offset[1],
                config.base_offset[2],
            ),
        }
    }

    /// End-effector pose (position + unit quaternion) for the joint angles.
    pub fn end_effector_pose(&self, joint_angles: &[f64]) -> Result<Pose> {
        if joint_angles.len() != self.dh_params.len() {
            return Err(AcquisitionError::Config(format!(
                "joint angle count ({}) doesn't match DH parameters ({})",
                joint_angles.len(),
                self.dh_params.len()
            )));
        }

        let mut transform = Matrix4::identity();
        transform[(0, 3)] = self.base_offset.x;
        transform[(1, 3)] = self.base_offset.y;
        transform[(2, 3)] = self.base_offset.z;

        for (dh, angle) in self.dh_params.iter().zip(joint_angles) {
            transform *= dh_transformation(dh.a, dh.alpha, dh.d, angle + dh.theta);
        }

        let rotation: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
        let orientation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        let q = orientation.quaternion();

        Ok(Pose::from_components(
            [transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]],
            [q.i, q.j, q.k, q.w],
        ))
    }
}

fn dh_transformation(a: f64, alpha: f64, d: f64, theta: f64) -> Matrix4<f64> {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_alpha, cos_alpha) = alpha.sin_cos();

    Matrix4::new(
        cos_theta, -sin_theta * cos_alpha,  sin_theta * sin_alpha, a * cos_theta,
        sin_theta,  cos_theta * cos_alpha, -cos_theta * sin_alpha, a * sin_theta,
        0.0,        sin_alpha,              cos_alpha,             d,
        0.0,        0.0,                    0.0,                   1.0,
    )
}
