use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::output_path;
use crate::comm::{AcquisitionBus, Subscription, Topic};
use crate::error::{AcquisitionError, Result};
use crate::types::{JointCommand, JointState, POSE_KEYS};
use crate::utils::now_millis;

/// One persisted acquisition cycle, stored as a line of `<outfile>.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointSampleRecord {
    pub sample: usize,
    pub run_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub limb: String,
    pub header_cfg: Vec<String>,
    pub header_pose: Vec<String>,
    /// Rows of `time` followed by measured joint angles in `header_cfg` order
    pub measured_cfg: Vec<Vec<f64>>,
    pub desired_cfg: Vec<Vec<f64>>,
    pub desired_pose: Vec<Vec<f64>>,
}

#[derive(Debug, Default)]
struct JointTrace {
    started_ms: u64,
    measured_cfg: Vec<Vec<f64>>,
    desired_cfg: Vec<Vec<f64>>,
    desired_pose: Vec<Vec<f64>>,
}

struct ActiveTrace {
    outfile: String,
    recorded_at: DateTime<Utc>,
    subscriptions: Vec<SubscriptionGuard>,
    worker: JoinHandle<JointTrace>,
}

enum SubscriptionGuard {
    States(Subscription<JointState>),
    Commands(Subscription<JointCommand>),
}

impl SubscriptionGuard {
    fn unsubscribe(&mut self) {
        match self {
            Self::States(sub) => sub.unsubscribe(),
            Self::Commands(sub) => sub.unsubscribe(),
        }
    }
}

struct FinishedTrace {
    outfile: String,
    recorded_at: DateTime<Utc>,
    trace: JointTrace,
}

/// Records joint states together with the desired configuration and pose of
/// each acquisition cycle and persists one record per cycle.
pub struct JointStateRecorder {
    limb: String,
    joint_names: Vec<String>,
    joint_states: Topic<JointState>,
    cfg_des: Topic<JointCommand>,
    pose_des: Topic<JointCommand>,
    run_id: Uuid,
    samples_written: usize,
    active: Option<ActiveTrace>,
    finished: Option<FinishedTrace>,
}

impl JointStateRecorder {
    pub fn new(limb: &str, joint_names: Vec<String>, bus: &AcquisitionBus) -> Self {
        Self {
            limb: limb.to_string(),
            joint_names,
            joint_states: bus.joint_states.clone(),
            cfg_des: bus.cfg_des.clone(),
            pose_des: bus.pose_des.clone(),
            run_id: Uuid::new_v4(),
            samples_written: 0,
            active: None,
            finished: None,
        }
    }

    /// `time` followed by the joint names
    pub fn header_cfg(&self) -> Vec<String> {
        std::iter::once("time".to_string())
            .chain(self.joint_names.iter().cloned())
            .collect()
    }

    /// `time` followed by the pose keys
    pub fn header_pose(&self) -> Vec<String> {
        std::iter::once("time")
            .chain(POSE_KEYS)
            .map(str::to_string)
            .collect()
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn start(&mut self, outfile: &str) -> Result<bool> {
        if self.active.is_some() {
            return Err(AcquisitionError::InvalidState(
                "joint recorder already started".into(),
            ));
        }
        self.finished = None;

        let states = self.joint_states.subscribe();
        let cfg = self.cfg_des.subscribe();
        let pose = self.pose_des.subscribe();
        let worker = tokio::spawn(collect_trace(
            self.joint_names.clone(),
            states.receiver(),
            cfg.receiver(),
            pose.receiver(),
        ));

        debug!("Joint recording started for sample {}", self.samples_written);
        self.active = Some(ActiveTrace {
            outfile: outfile.to_string(),
            recorded_at: Utc::now(),
            subscriptions: vec![
                SubscriptionGuard::States(states),
                SubscriptionGuard::Commands(cfg),
                SubscriptionGuard::Commands(pose),
            ],
            worker,
        });
        Ok(true)
    }

    /// Stop collecting; the trace is kept until [`write_sample`].
    ///
    /// [`write_sample`]: Self::write_sample
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        for sub in &mut active.subscriptions {
            sub.unsubscribe();
        }
        let trace = active
            .worker
            .await
            .map_err(|e| AcquisitionError::InvalidState(format!("joint worker failed: {}", e)))?;

        debug!("Joint recording stopped with {} states", trace.measured_cfg.len());
        self.finished = Some(FinishedTrace {
            outfile: active.outfile,
            recorded_at: active.recorded_at,
            trace,
        });
        Ok(())
    }

    /// Discard a stopped trace without persisting it.
    pub fn discard_sample(&mut self) {
        self.finished = None;
    }

    /// Append the last stopped trace to `<outfile>.jsonl`.
    pub fn write_sample(&mut self) -> Result<PathBuf> {
        let finished = self.finished.take().ok_or_else(|| {
            AcquisitionError::InvalidState("no stopped joint recording to write".into())
        })?;

        let record = JointSampleRecord {
            sample: self.samples_written,
            run_id: self.run_id,
            recorded_at: finished.recorded_at,
            limb: self.limb.clone(),
            header_cfg: self.header_cfg(),
            header_pose: self.header_pose(),
            measured_cfg: finished.trace.measured_cfg,
            desired_cfg: finished.trace.desired_cfg,
            desired_pose: finished.trace.desired_pose,
        };

        let path = output_path(&finished.outfile, "jsonl");
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(&line))
            .map_err(|e| AcquisitionError::io(&path, e))?;

        info!(
            "Wrote sample {} ({} joint states) to {}",
            record.sample,
            record.measured_cfg.len(),
            path.display()
        );
        self.samples_written += 1;
        Ok(path)
    }
}

fn seconds_since(start_ms: u64, stamp_ms: u64) -> f64 {
    (stamp_ms as i64 - start_ms as i64) as f64 / 1000.0
}

async fn collect_trace(
    joint_names: Vec<String>,
    states: flume::Receiver<JointState>,
    cfg: flume::Receiver<JointCommand>,
    pose: flume::Receiver<JointCommand>,
) -> JointTrace {
    let mut trace = JointTrace {
        started_ms: now_millis(),
        ..JointTrace::default()
    };

    let command_row = |start: u64, cmd: JointCommand| {
        std::iter::once(seconds_since(start, now_millis()))
            .chain(cmd.command)
            .collect::<Vec<f64>>()
    };

    loop {
        tokio::select! {
            Ok(state) = states.recv_async() => {
                let row = std::iter::once(seconds_since(trace.started_ms, state.timestamp))
                    .chain(joint_names.iter().map(|n| state.position(n).unwrap_or(f64::NAN)))
                    .collect();
                trace.measured_cfg.push(row);
            }
            Ok(cmd) = cfg.recv_async() => {
                trace.desired_cfg.push(command_row(trace.started_ms, cmd));
            }
            Ok(cmd) = pose.recv_async() => {
                trace.desired_pose.push(command_row(trace.started_ms, cmd));
            }
            else => break,
        }
    }

    trace
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["left_s0".to_string(), "left_s1".to_string()]
    }

    #[test]
    fn test_headers() {
        let bus = AcquisitionBus::new("left", "head_camera");
        let recorder = JointStateRecorder::new("left", names(), &bus);
        assert_eq!(recorder.header_cfg(), vec!["time", "left_s0", "left_s1"]);
        assert_eq!(recorder.header_pose()[0], "time");
        assert_eq!(recorder.header_pose().len(), 8);
    }

    #[tokio::test]
    async fn test_samples_are_appended_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let outfile = dir.path().join("run");
        let outfile = outfile.to_str().unwrap();
        let bus = AcquisitionBus::new("left", "head_camera");
        let mut recorder = JointStateRecorder::new("left", names(), &bus);

        for cycle in 0..2 {
            recorder.start(outfile).unwrap();
            let mut state = JointState::new(names());
            state.positions = vec![0.1 * cycle as f64, 0.2];
            bus.joint_states.publish(state);
            bus.cfg_des.publish(JointCommand {
                names: names(),
                command: vec![0.3, 0.4],
            });
            recorder.stop().await.unwrap();
            recorder.write_sample().unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("run.jsonl")).unwrap();
        let records: Vec<JointSampleRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample, 1);
        assert_eq!(records[0].run_id, records[1].run_id);
        assert_eq!(records[1].measured_cfg.len(), 1);
        assert_eq!(records[1].measured_cfg[0][1..], [0.1, 0.2]);
        assert_eq!(records[0].desired_cfg[0][1..], [0.3, 0.4]);
        assert!(records[0].desired_pose.is_empty());
    }

    #[tokio::test]
    async fn test_write_without_stop_is_rejected() {
        let bus = AcquisitionBus::new("left", "head_camera");
        let mut recorder = JointStateRecorder::new("left", names(), &bus);
        assert!(matches!(
            recorder.write_sample(),
            Err(AcquisitionError::InvalidState(_))
        ));

        recorder.start("unused").unwrap();
        recorder.stop().await.unwrap();
        recorder.discard_sample();
        assert!(recorder.write_sample().is_err());
        assert_eq!(bus.joint_states.subscriber_count(), 0);
    }
}
