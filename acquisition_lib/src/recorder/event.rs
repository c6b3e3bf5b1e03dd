use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{output_path, TimestampLog};
use crate::comm::{Subscription, Topic};
use crate::error::{AcquisitionError, Result};

/// Writes the arrival timestamp of every scalar event (e.g. head screen
/// flashes) into `<outname>.txt`.
pub struct EventTimestampRecorder {
    events: Topic<f64>,
    active: Option<ActiveLog>,
}

struct ActiveLog {
    subscription: Subscription<f64>,
    worker: JoinHandle<Result<u64>>,
}

impl EventTimestampRecorder {
    pub fn new(events: Topic<f64>) -> Self {
        Self {
            events,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Open the log, write its header and subscribe to the event channel.
    pub fn start(&mut self, outname: &str) -> Result<bool> {
        if self.active.is_some() {
            return Err(AcquisitionError::InvalidState(
                "event recorder already started".into(),
            ));
        }

        let path = output_path(outname, "txt");
        let mut log = TimestampLog::create(&path).map_err(|e| {
            error!("start - Problem with opening text file {}: {}", path.display(), e);
            e
        })?;

        let subscription = self.events.subscribe();
        let rx = subscription.receiver();
        let worker = tokio::task::spawn_blocking(move || {
            for stamp in rx.iter() {
                log.append(stamp)?;
            }
            log.close()
        });

        info!("Recording {} into {}", subscription.topic_name(), path.display());
        self.active = Some(ActiveLog {
            subscription,
            worker,
        });
        Ok(true)
    }

    /// Unsubscribe, then close the log once the buffered events are written.
    ///
    /// Returns whether the log is closed.
    pub async fn stop(&mut self) -> Result<bool> {
        let Some(mut active) = self.active.take() else {
            return Ok(true);
        };

        active.subscription.unsubscribe();
        let lines = active
            .worker
            .await
            .map_err(|e| AcquisitionError::InvalidState(format!("event log worker failed: {}", e)))?
            .map_err(|e| {
                error!("add_timestamp - Writing event timestamp failed: {}", e);
                e
            })?;

        info!("Event log closed after {} timestamp(s)", lines);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_then_stop_writes_only_header() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("flash");
        let mut recorder = EventTimestampRecorder::new(Topic::new("flash"));

        assert!(recorder.start(outname.to_str().unwrap()).unwrap());
        assert!(recorder.stop().await.unwrap());

        let content = std::fs::read_to_string(dir.path().join("flash.txt")).unwrap();
        assert_eq!(content, "# timestamps [s]\n");
    }

    #[tokio::test]
    async fn test_events_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("flash");
        let topic = Topic::new("flash");
        let mut recorder = EventTimestampRecorder::new(topic.clone());

        recorder.start(outname.to_str().unwrap()).unwrap();
        for stamp in [3.25, 1.0, 2.5] {
            topic.publish(stamp);
        }
        recorder.stop().await.unwrap();
        // after stop nothing more is delivered
        topic.publish(9.0);

        let content = std::fs::read_to_string(dir.path().join("flash.txt")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["# timestamps [s]", "3.250000", "1.000000", "2.500000"]);
    }

    #[tokio::test]
    async fn test_unopenable_log_fails_and_stop_is_safe() {
        let mut recorder = EventTimestampRecorder::new(Topic::new("flash"));
        let err = recorder.start("/nonexistent-dir/sub/flash").unwrap_err();
        assert!(matches!(err, AcquisitionError::Io { .. }));
        assert!(!recorder.is_recording());
        assert!(recorder.stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("flash");
        let mut recorder = EventTimestampRecorder::new(Topic::new("flash"));
        recorder.start(outname.to_str().unwrap()).unwrap();
        assert!(matches!(
            recorder.start(outname.to_str().unwrap()),
            Err(AcquisitionError::InvalidState(_))
        ));
        recorder.stop().await.unwrap();
    }
}
