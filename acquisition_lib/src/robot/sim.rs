use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Robot;
use crate::comm::{AcquisitionBus, Topic};
use crate::error::{AcquisitionError, Result};
use crate::types::{AcquisitionConfig, CameraFrame, CameraParameters, Configuration, JointState};

const FALLBACK_PUBLISH_RATE: u16 = 100;

/// Synthetic camera publishing RGB8 frames while open.
pub struct SimulatedCamera {
    name: String,
    frames: Topic<CameraFrame>,
    params: Arc<Mutex<CameraParameters>>,
    running: Option<(CancellationToken, JoinHandle<u64>)>,
}

impl SimulatedCamera {
    pub fn new(name: &str, frames: Topic<CameraFrame>, params: CameraParameters) -> Self {
        Self {
            name: name.to_string(),
            frames,
            params: Arc::new(Mutex::new(params)),
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.running.is_some()
    }

    pub fn parameters(&self) -> CameraParameters {
        *self.params.lock()
    }

    /// Takes effect from the next frame on.
    pub fn set_parameters(&self, params: CameraParameters) {
        *self.params.lock() = params;
    }

    pub fn open(&mut self) {
        if self.running.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let task = tokio::spawn(stream_frames(
            self.frames.clone(),
            self.params.clone(),
            token.clone(),
        ));
        info!("Camera {} opened", self.name);
        self.running = Some((token, task));
    }

    /// Stop streaming; returns the number of frames published while open.
    pub async fn close(&mut self) -> u64 {
        let Some((token, task)) = self.running.take() else {
            return 0;
        };
        token.cancel();
        let frames = task.await.unwrap_or_else(|e| {
            warn!("Camera {} task failed: {}", self.name, e);
            0
        });
        info!("Camera {} closed after {} frames", self.name, frames);
        frames
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        if let Some((token, _)) = &self.running {
            token.cancel();
        }
    }
}

fn synthetic_frame(frame_id: u64, width: u32, height: u32) -> CameraFrame {
    let shift = (frame_id % 256) as u8;
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                (x % 256) as u8 ^ shift,
                (y % 256) as u8,
                shift,
            ]);
        }
    }
    CameraFrame::rgb8(frame_id, width, height, data)
}

async fn stream_frames(
    frames: Topic<CameraFrame>,
    params: Arc<Mutex<CameraParameters>>,
    shutdown: CancellationToken,
) -> u64 {
    let mut frame_id = 0;
    loop {
        let current = *params.lock();
        frames.publish(synthetic_frame(frame_id, current.width, current.height));
        frame_id += 1;

        let period = Duration::from_secs_f64(1.0 / current.fps.max(0.1));
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }
    frame_id
}

/// In-memory arm that interpolates motions and reports joint states on the
/// bus at the latched publish rate.
pub struct SimulatedArm {
    joint_names: Vec<String>,
    neutral: Configuration,
    position: Vec<f64>,
    enabled: bool,
    speed: f64,
    motion: Duration,
    joint_states: Topic<JointState>,
    publish_rate: Topic<u16>,
    cameras: HashMap<String, SimulatedCamera>,
}

impl SimulatedArm {
    /// An arm resting in its neutral configuration with the configured
    /// primary and secondary cameras, both closed.
    pub fn new(config: &AcquisitionConfig, bus: &AcquisitionBus) -> Self {
        let params = config.camera_parameters();
        let mut cameras = HashMap::new();
        cameras.insert(
            config.camera.name.clone(),
            SimulatedCamera::new(&config.camera.name, bus.frames.clone(), params),
        );
        if let Some(secondary) = &config.camera.secondary {
            let topic = Topic::new(format!("cameras/{}/image", secondary));
            cameras.insert(secondary.clone(), SimulatedCamera::new(secondary, topic, params));
        }

        Self {
            joint_names: config.arm.joint_names(),
            neutral: config.arm.neutral_configuration(),
            position: config.arm.neutral.clone(),
            enabled: false,
            speed: config.arm.joint_position_speed,
            motion: config.motion_duration(),
            joint_states: bus.joint_states.clone(),
            publish_rate: bus.publish_rate.clone(),
            cameras,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Current joint angles in joint-name order
    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn camera(&self, name: &str) -> Option<&SimulatedCamera> {
        self.cameras.get(name)
    }

    fn publish_state(&self) {
        let mut state = JointState::new(self.joint_names.clone());
        state.positions = self.position.clone();
        self.joint_states.publish(state);
    }

    async fn move_to(&mut self, target: Vec<f64>) -> Result<()> {
        if !self.enabled {
            return Err(AcquisitionError::Robot("cannot move, robot is disabled".into()));
        }

        let rate = self
            .publish_rate
            .latched()
            .unwrap_or(FALLBACK_PUBLISH_RATE)
            .max(1);
        // full-speed duration stretched by the joint position speed
        let secs = self.motion.as_secs_f64() / self.speed;
        let steps = ((secs * rate as f64).ceil() as usize).max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / rate as f64));
        let start = self.position.clone();

        for step in 1..=steps {
            ticker.tick().await;
            let t = step as f64 / steps as f64;
            self.position = start
                .iter()
                .zip(&target)
                .map(|(from, to)| from + (to - from) * t)
                .collect();
            self.publish_state();
        }
        Ok(())
    }

    fn camera_mut(&mut self, name: &str) -> Result<&mut SimulatedCamera> {
        self.cameras
            .get_mut(name)
            .ok_or_else(|| AcquisitionError::CameraNotFound(name.to_string()))
    }
}

#[async_trait]
impl Robot for SimulatedArm {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled)
    }

    async fn enable(&mut self) -> Result<()> {
        info!("Enabling robot...");
        self.enabled = true;
        Ok(())
    }

    async fn disable(&mut self) -> Result<()> {
        info!("Disabling robot...");
        self.enabled = false;
        Ok(())
    }

    async fn set_joint_position_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed > 0.0 && speed <= 1.0) {
            return Err(AcquisitionError::Robot(format!(
                "joint position speed {} outside (0, 1]",
                speed
            )));
        }
        self.speed = speed;
        Ok(())
    }

    async fn move_to_neutral(&mut self) -> Result<()> {
        debug!("Moving to neutral");
        let target = self.neutral.ordered(&self.joint_names)?;
        self.move_to(target).await
    }

    async fn move_to_joint_positions(&mut self, target: &Configuration) -> Result<()> {
        let target = target.ordered(&self.joint_names)?;
        self.move_to(target).await
    }

    async fn configure_camera(&mut self, name: &str, params: CameraParameters) -> Result<()> {
        params.validate()?;
        let camera = self.camera_mut(name)?;
        camera.set_parameters(params);
        camera.open();
        Ok(())
    }

    async fn close_camera(&mut self, name: &str) -> Result<()> {
        self.camera_mut(name)?.close().await;
        Ok(())
    }
}
