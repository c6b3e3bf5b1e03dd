use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{debug, info, warn};

use crate::error::{AcquisitionError, Result};
use crate::types::{AcquisitionConfig, ArmConfig, Configuration, Pose};
use crate::utils::ForwardKinematics;

/// Candidate targets: `poses[i]` is reached by `configurations[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseTable {
    poses: Vec<Pose>,
    configurations: Vec<Configuration>,
}

impl PoseTable {
    pub fn from_lists(poses: Vec<Pose>, configurations: Vec<Configuration>) -> Result<Self> {
        if poses.len() != configurations.len() {
            return Err(AcquisitionError::Config(format!(
                "pose table has {} poses but {} configurations",
                poses.len(),
                configurations.len()
            )));
        }
        Ok(Self {
            poses,
            configurations,
        })
    }

    /// Load `{"poses": [...], "configurations": [...]}` from a JSON file.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AcquisitionError::io(path, e))?;
        let table: PoseTable = serde_json::from_str(&content)?;
        let table = Self::from_lists(table.poses, table.configurations)?;
        info!("Loaded {} pose candidates from {}", table.len(), path);
        Ok(table)
    }

    /// Sample `count` configurations uniformly inside the joint limits and
    /// pair each with its forward-kinematics pose.
    pub fn from_forward_kinematics<R: Rng>(arm: &ArmConfig, count: usize, rng: &mut R) -> Result<Self> {
        let fk = ForwardKinematics::new(arm);
        let names = arm.joint_names();
        let mut poses = Vec::with_capacity(count);
        let mut configurations = Vec::with_capacity(count);

        for _ in 0..count {
            let angles: Vec<f64> = arm
                .joint_limits
                .iter()
                .map(|limit| rng.gen_range(limit.min_angle..=limit.max_angle))
                .collect();
            poses.push(fk.end_effector_pose(&angles)?);
            configurations.push(Configuration::from_pairs(names.iter().cloned().zip(angles)));
        }

        debug!("Sampled {} pose candidates for the {} limb", count, arm.limb);
        Self::from_lists(poses, configurations)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

/// Draws targets from a [`PoseTable`] without repeating the previous draw.
pub struct PoseSampler {
    table: PoseTable,
    previous: Option<usize>,
    rng: StdRng,
}

impl PoseSampler {
    pub fn new(table: PoseTable, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        if table.len() == 1 {
            warn!("Pose table has a single candidate; it will be repeated");
        }
        Self {
            table,
            previous: None,
            rng,
        }
    }

    /// Sampler over the configured pose table file, or over a table sampled
    /// with forward kinematics when no file is configured.
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        let poses = &config.poses;
        let table = match &poses.table {
            Some(path) => PoseTable::load_from_file(path)?,
            None => {
                let mut rng = match poses.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                PoseTable::from_forward_kinematics(&config.arm, poses.count, &mut rng)?
            }
        };
        Ok(Self::new(table, poses.seed))
    }

    pub fn table(&self) -> &PoseTable {
        &self.table
    }

    /// Index, pose and configuration of the next target.
    ///
    /// A single-candidate table returns that candidate every time.
    pub fn next(&mut self) -> Result<(usize, Pose, Configuration)> {
        let len = self.table.len();
        if len == 0 {
            return Err(AcquisitionError::EmptyCandidateSet);
        }

        let idx = if len == 1 {
            0
        } else {
            loop {
                let idx = self.rng.gen_range(0..len);
                if Some(idx) != self.previous {
                    break idx;
                }
            }
        };

        self.previous = Some(idx);
        Ok((
            idx,
            self.table.poses[idx].clone(),
            self.table.configurations[idx].clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> PoseTable {
        let poses = (0..n)
            .map(|i| Pose::from_components([i as f64, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]))
            .collect();
        let configs = (0..n)
            .map(|i| Configuration::from_pairs([("left_s0", i as f64)]))
            .collect();
        PoseTable::from_lists(poses, configs).unwrap()
    }

    #[test]
    fn test_no_consecutive_repeats() {
        let mut sampler = PoseSampler::new(table(2), Some(7));
        let mut last = None;
        for _ in 0..200 {
            let (idx, pose, cfg) = sampler.next().unwrap();
            assert_ne!(Some(idx), last);
            assert_eq!(pose.get("px"), Some(idx as f64));
            assert_eq!(cfg.get("left_s0"), Some(idx as f64));
            last = Some(idx);
        }
    }

    #[test]
    fn test_single_candidate_is_repeated() {
        let mut sampler = PoseSampler::new(table(1), None);
        assert_eq!(sampler.next().unwrap().0, 0);
        assert_eq!(sampler.next().unwrap().0, 0);
    }

    #[test]
    fn test_empty_table_fails_fast() {
        let mut sampler = PoseSampler::new(PoseTable::default(), Some(1));
        assert!(matches!(sampler.next(), Err(AcquisitionError::EmptyCandidateSet)));
    }

    #[test]
    fn test_mismatched_lists_rejected() {
        let poses = vec![Pose::default(), Pose::default()];
        let configs = vec![Configuration::default()];
        assert!(PoseTable::from_lists(poses, configs).is_err());
    }

    #[test]
    fn test_forward_kinematics_table_respects_limits() {
        let arm = ArmConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let table = PoseTable::from_forward_kinematics(&arm, 20, &mut rng).unwrap();
        assert_eq!(table.len(), 20);

        for cfg in &table.configurations {
            let angles = cfg.ordered(&arm.joint_names()).unwrap();
            for (angle, limit) in angles.iter().zip(&arm.joint_limits) {
                assert!(*angle >= limit.min_angle && *angle <= limit.max_angle);
            }
        }
        for pose in &table.poses {
            let norm: f64 = ["ox", "oy", "oz", "ow"]
                .iter()
                .map(|k| pose.get(k).unwrap().powi(2))
                .sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poses.json");
        std::fs::write(&path, serde_json::to_string(&table(3)).unwrap()).unwrap();

        let loaded = PoseTable::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.len(), 3);

        std::fs::write(&path, r#"{"poses": [{"px": 1.0}], "configurations": []}"#).unwrap();
        assert!(PoseTable::load_from_file(path.to_str().unwrap()).is_err());
    }
}
