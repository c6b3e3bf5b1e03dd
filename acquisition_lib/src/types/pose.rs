use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::JointCommand;
use crate::error::{AcquisitionError, Result};

/// Keys of a pose: position followed by a unit quaternion.
pub const POSE_KEYS: [&str; 7] = ["px", "py", "pz", "ox", "oy", "oz", "ow"];

/// Target end-effector position and orientation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose(pub BTreeMap<String, f64>);

/// Target joint angles (rad) keyed by joint name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(pub BTreeMap<String, f64>);

impl Pose {
    pub fn from_components(position: [f64; 3], orientation: [f64; 4]) -> Self {
        let values = position.iter().chain(orientation.iter());
        Pose(
            POSE_KEYS
                .iter()
                .zip(values)
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }
}

impl Configuration {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Configuration(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, joint: &str) -> Option<f64> {
        self.0.get(joint).copied()
    }

    /// Joint angles in the given joint order.
    pub fn ordered(&self, names: &[String]) -> Result<Vec<f64>> {
        names
            .iter()
            .map(|n| {
                self.get(n).ok_or_else(|| {
                    AcquisitionError::Config(format!("configuration has no joint '{}'", n))
                })
            })
            .collect()
    }
}

/// Builds a telemetry command whose fields follow `header`, skipping its
/// leading timestamp column.
pub fn command_from_header(
    header: &[String],
    lookup: impl Fn(&str) -> Option<f64>,
) -> Result<JointCommand> {
    let names: Vec<String> = header.iter().skip(1).cloned().collect();
    let command = names
        .iter()
        .map(|n| {
            lookup(n).ok_or_else(|| {
                AcquisitionError::Config(format!("no value for header field '{}'", n))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(JointCommand { names, command })
}
