//! The robot seen by a recording session.

mod sim;

pub use sim::{SimulatedArm, SimulatedCamera};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CameraParameters, Configuration};

/// One limb of a robot together with its cameras.
///
/// Motions return once the target is reached; callers race them against a
/// shutdown signal and may drop the future midway.
#[async_trait]
pub trait Robot: Send + Sync {
    async fn is_enabled(&self) -> Result<bool>;

    async fn enable(&mut self) -> Result<()>;

    async fn disable(&mut self) -> Result<()>;

    /// Fraction of the maximum joint speed, in `(0, 1]`
    async fn set_joint_position_speed(&mut self, speed: f64) -> Result<()>;

    async fn move_to_neutral(&mut self) -> Result<()>;

    async fn move_to_joint_positions(&mut self, target: &Configuration) -> Result<()>;

    /// Set resolution and frame rate, opening the camera if needed.
    ///
    /// Unknown cameras are [`CameraNotFound`](crate::AcquisitionError::CameraNotFound).
    async fn configure_camera(&mut self, name: &str, params: CameraParameters) -> Result<()>;

    async fn close_camera(&mut self, name: &str) -> Result<()>;
}
