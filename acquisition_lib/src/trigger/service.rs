use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::TriggerTransport;
use crate::comm::Topic;
use crate::error::{AcquisitionError, Result};
use crate::recorder::{VideoOptions, VideoRecorder};
use crate::types::{CameraFrame, CameraParameters, TriggerCommand, TriggerRequest, TriggerResponse};

/// Request/response endpoint starting and stopping one video recording.
///
/// Idle -> Recording on a valid start request, Recording -> Idle on a stop
/// request. A start while recording and a stop while idle are rejected with
/// `success = false`.
pub struct TriggerService {
    recorder: VideoRecorder,
}

impl TriggerService {
    pub fn new(frames: Topic<CameraFrame>, options: VideoOptions) -> Self {
        Self {
            recorder: VideoRecorder::new(frames, options),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub async fn handle(&mut self, request: TriggerRequest) -> TriggerResponse {
        let command = match request.validate() {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected trigger request: {}", e);
                return TriggerResponse::rejected(e.to_string());
            }
        };

        match command {
            TriggerCommand::Start {
                output_name,
                params,
            } => self.start(&output_name, params),
            TriggerCommand::Stop => self.stop().await,
        }
    }

    fn start(&mut self, output_name: &str, params: CameraParameters) -> TriggerResponse {
        if let Some(current) = self.recorder.output() {
            let message = format!("Already recording to {}", current.display());
            warn!("Rejected start request: {}", message);
            return TriggerResponse::rejected(message);
        }

        match self.recorder.start(output_name, params) {
            Ok(true) => {
                info!("Trigger service started recording '{}'", output_name);
                TriggerResponse::ok(format!("Started recording to {}.avi", output_name))
            }
            Ok(false) => TriggerResponse::rejected("Video writer did not open"),
            Err(e) => {
                error!("Trigger service failed to start recording: {}", e);
                TriggerResponse::rejected(format!("Failed to start recording: {}", e))
            }
        }
    }

    async fn stop(&mut self) -> TriggerResponse {
        if !self.recorder.is_recording() {
            warn!("Rejected stop request: not recording");
            return TriggerResponse::rejected("Not recording");
        }

        match self.recorder.stop().await {
            Ok(false) => {
                let message = match self.recorder.last_clip() {
                    Some(clip) => format!(
                        "Stopped recording {} ({} frames)",
                        clip.path.display(),
                        clip.frames
                    ),
                    None => "Stopped recording".to_string(),
                };
                info!("{}", message);
                TriggerResponse::ok(message)
            }
            Ok(true) => TriggerResponse::rejected("Video writer is still open"),
            Err(e) => {
                error!("Recording failed: {}", e);
                TriggerResponse::rejected(format!("Recording failed: {}", e))
            }
        }
    }

    /// Release a recording left open by the remote client.
    pub async fn shutdown(&mut self) {
        if self.recorder.is_recording() {
            warn!("Shutting down while recording; releasing video writer");
            if let Err(e) = self.recorder.stop().await {
                error!("Releasing video writer failed: {}", e);
            }
        }
    }
}

/// A request paired with the channel its response goes back on.
pub type TriggerCall = (TriggerRequest, oneshot::Sender<TriggerResponse>);

/// Handle calls one at a time until the channel closes or `shutdown` fires.
pub async fn serve(
    mut service: TriggerService,
    mut calls: mpsc::Receiver<TriggerCall>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            call = calls.recv() => match call {
                Some((request, reply)) => {
                    let response = service.handle(request).await;
                    if reply.send(response).is_err() {
                        warn!("Trigger caller went away before the response");
                    }
                }
                None => break,
            },
        }
    }
    service.shutdown().await;
    info!("Trigger service stopped");
}

/// Run `service` on a task and return an in-process transport to it.
pub fn spawn_local(
    service: TriggerService,
    shutdown: CancellationToken,
) -> (LocalTrigger, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(serve(service, rx, shutdown));
    (LocalTrigger { calls: tx }, handle)
}

/// In-process transport to a served [`TriggerService`].
#[derive(Clone)]
pub struct LocalTrigger {
    calls: mpsc::Sender<TriggerCall>,
}

#[async_trait]
impl TriggerTransport for LocalTrigger {
    async fn wait_for_service(&self, _timeout: Option<Duration>) -> Result<()> {
        if self.calls.is_closed() {
            return Err(AcquisitionError::Transport("trigger service is not running".into()));
        }
        Ok(())
    }

    async fn call(&self, request: TriggerRequest) -> Result<TriggerResponse> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send((request, tx))
            .await
            .map_err(|_| AcquisitionError::Transport("trigger service is not running".into()))?;
        rx.await
            .map_err(|_| AcquisitionError::Transport("trigger service dropped the call".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("test2");
        let outname = outname.to_str().unwrap();
        let mut service = TriggerService::new(Topic::new("image"), VideoOptions::default());

        let started = service
            .handle(TriggerRequest::start(outname, 14.0, (1280, 800)))
            .await;
        assert!(started.success, "{}", started.message);
        assert!(service.is_recording());

        let again = service
            .handle(TriggerRequest::start(outname, 14.0, (1280, 800)))
            .await;
        assert!(!again.success);
        assert!(again.message.contains("Already recording"));

        assert!(service.handle(TriggerRequest::stop()).await.success);
        assert!(!service.is_recording());

        let idle_stop = service.handle(TriggerRequest::stop()).await;
        assert!(!idle_stop.success);
        assert_eq!(idle_stop.message, "Not recording");
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let mut service = TriggerService::new(Topic::new("image"), VideoOptions::default());
        let mut request = TriggerRequest::start("x", 14.0, (1280, 800));
        request.outname = None;

        let response = service.handle(request).await;
        assert!(!response.success);
        assert!(!service.is_recording());
    }

    #[tokio::test]
    async fn test_unopenable_output_reported() {
        let mut service = TriggerService::new(Topic::new("image"), VideoOptions::default());
        let response = service
            .handle(TriggerRequest::start("/nonexistent-dir/x/clip", 14.0, (64, 48)))
            .await;
        assert!(!response.success);
        assert!(response.message.starts_with("Failed to start recording"));
        assert!(!service.is_recording());
    }

    #[tokio::test]
    async fn test_shutdown_releases_open_recording() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("left-open");
        let frames = Topic::new("image");
        let service = TriggerService::new(frames.clone(), VideoOptions::default());
        let shutdown = CancellationToken::new();
        let (transport, handle) = spawn_local(service, shutdown.clone());

        let response = transport
            .call(TriggerRequest::start(outname.to_str().unwrap(), 14.0, (64, 48)))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(frames.subscriber_count(), 1);

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(frames.subscriber_count(), 0);
        assert!(transport.call(TriggerRequest::stop()).await.is_err());
    }
}
