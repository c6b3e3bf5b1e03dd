use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use super::{CameraParameters, Configuration};
use crate::error::{AcquisitionError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/acquisition.toml";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_ENV: &str = "ACQUISITION_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default)]
    pub arm: ArmConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub poses: PoseConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    /// Limb to record from ("left" or "right")
    pub limb: String,
    /// Joint names without the limb prefix
    pub joints: Vec<String>,
    pub neutral: Vec<f64>,
    pub joint_position_speed: f64,
    pub joint_limits: Vec<JointLimit>,
    pub dh_parameters: Vec<DHParameter>,
    pub base_offset: [f64; 3], // x, y, z
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointLimit {
    pub min_angle: f64,
    pub max_angle: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DHParameter {
    pub a: f64,     // link length
    pub alpha: f64, // link twist
    pub d: f64,     // link offset
    pub theta: f64, // joint angle offset
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Joint state publish rate requested while recording
    pub rate_hz: u16,
    /// Publish rate restored on shutdown
    pub shutdown_rate_hz: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Camera closed during initialization when present
    pub secondary: Option<String>,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Write a per-frame timestamp log next to each video
    pub timestamp_log: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Number of candidates generated when no table file is given
    pub count: usize,
    pub seed: Option<u64>,
    /// JSON pose table; generated from forward kinematics when absent
    pub table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub service_name: String,
    /// Unbounded when absent
    pub wait_timeout_secs: Option<f64>,
    pub call_timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Duration of one motion at joint position speed 1.0
    pub motion_secs: f64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        use std::f64::consts::FRAC_PI_2;

        let limit = |min_angle, max_angle| JointLimit {
            min_angle,
            max_angle,
        };
        let dh = |a, alpha, d, theta| DHParameter { a, alpha, d, theta };

        Self {
            limb: "left".to_string(),
            joints: ["s0", "s1", "e0", "e1", "w0", "w1", "w2"]
                .iter()
                .map(|j| j.to_string())
                .collect(),
            neutral: vec![0.0, -0.55, 0.0, 0.75, 0.0, 1.26, 0.0],
            joint_position_speed: 0.3,
            joint_limits: vec![
                limit(-1.7016, 1.7016),
                limit(-2.147, 1.047),
                limit(-3.0541, 3.0541),
                limit(-0.05, 2.618),
                limit(-3.059, 3.059),
                limit(-1.5707, 2.094),
                limit(-3.059, 3.059),
            ],
            dh_parameters: vec![
                dh(0.069, -FRAC_PI_2, 0.27035, 0.0),
                dh(0.0, FRAC_PI_2, 0.0, FRAC_PI_2),
                dh(0.069, -FRAC_PI_2, 0.36435, 0.0),
                dh(0.0, FRAC_PI_2, 0.0, 0.0),
                dh(0.010, -FRAC_PI_2, 0.37429, 0.0),
                dh(0.0, FRAC_PI_2, 0.0, 0.0),
                dh(0.0, 0.0, 0.229525, 0.0),
            ],
            base_offset: [0.064, 0.259, 0.130],
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 100,
            shutdown_rate_hz: 100,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: "head_camera".to_string(),
            secondary: Some("right_hand_camera".to_string()),
            fps: 14.0,
            width: 1280,
            height: 800,
            jpeg_quality: 90,
            timestamp_log: false,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            count: 50,
            seed: None,
            table: None,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            service_name: "camera_service".to_string(),
            wait_timeout_secs: None,
            call_timeout_secs: 10.0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { motion_secs: 2.0 }
    }
}

impl AcquisitionConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| AcquisitionError::io(path, e))?;
        let config: AcquisitionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Explicit path, else `$ACQUISITION_CONFIG`, else the default path.
    pub fn resolve_path(explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Like [`load_from_file`](Self::load_from_file), falling back to the
    /// defaults when the file does not exist.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            tracing::info!("Loading configuration from {}", path);
            Self::load_from_file(path)
        } else {
            tracing::warn!("Configuration {} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dof = self.arm.joints.len();
        if dof == 0 {
            return Err(AcquisitionError::Config("arm has no joints".into()));
        }
        if self.arm.limb.trim().is_empty() {
            return Err(AcquisitionError::Config("limb name is empty".into()));
        }

        let counts = [
            ("Neutral configuration", self.arm.neutral.len()),
            ("Joint limits", self.arm.joint_limits.len()),
            ("DH parameters", self.arm.dh_parameters.len()),
        ];
        for (what, count) in counts {
            if count != dof {
                return Err(AcquisitionError::Config(format!(
                    "{} count ({}) doesn't match joint count ({})",
                    what, count, dof
                )));
            }
        }

        if let Some(bad) = self
            .arm
            .joint_limits
            .iter()
            .position(|l| l.min_angle > l.max_angle)
        {
            return Err(AcquisitionError::Config(format!(
                "joint limit {} has min above max",
                bad
            )));
        }

        let speed = self.arm.joint_position_speed;
        if !(speed > 0.0 && speed <= 1.0) {
            return Err(AcquisitionError::Config(format!(
                "joint position speed {} outside (0, 1]",
                speed
            )));
        }

        self.camera_parameters().validate()?;

        if self.poses.count == 0 {
            return Err(AcquisitionError::Config(
                "pose candidate count must be positive".into(),
            ));
        }

        let durations = [
            ("trigger.wait_timeout_secs", self.trigger.wait_timeout_secs),
            ("trigger.call_timeout_secs", Some(self.trigger.call_timeout_secs)),
            ("simulation.motion_secs", Some(self.simulation.motion_secs)),
        ];
        for (what, secs) in durations {
            if let Some(secs) = secs {
                if Duration::try_from_secs_f64(secs).is_err() {
                    return Err(AcquisitionError::Config(format!(
                        "{} must be a non-negative number of seconds, got {}",
                        what, secs
                    )));
                }
            }
        }

        Ok(())
    }
}

impl AcquisitionConfig {
    pub fn camera_parameters(&self) -> CameraParameters {
        CameraParameters::new(self.camera.fps, self.camera.width, self.camera.height)
    }

    pub fn motion_duration(&self) -> Duration {
        Duration::from_secs_f64(self.simulation.motion_secs.max(0.0))
    }
}

impl ArmConfig {
    /// Fully qualified joint names, e.g. `left_s0`
    pub fn joint_names(&self) -> Vec<String> {
        self.joints
            .iter()
            .map(|j| format!("{}_{}", self.limb, j))
            .collect()
    }

    pub fn neutral_configuration(&self) -> Configuration {
        Configuration::from_pairs(self.joint_names().into_iter().zip(self.neutral.iter().copied()))
    }
}

impl TriggerConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.call_timeout_secs)
    }
}
