use serde::{Deserialize, Serialize};

use crate::utils::now_millis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointState {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub efforts: Vec<f64>,
    pub timestamp: u64,
}

/// Desired values published on the telemetry channels, one entry per name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointCommand {
    pub names: Vec<String>,
    pub command: Vec<f64>,
}

impl JointState {
    pub fn new(names: Vec<String>) -> Self {
        let dof = names.len();
        Self {
            names,
            positions: vec![0.0; dof],
            velocities: vec![0.0; dof],
            efforts: vec![0.0; dof],
            timestamp: now_millis(),
        }
    }

    /// Position of the named joint, if present
    pub fn position(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.positions.get(i).copied())
    }
}
