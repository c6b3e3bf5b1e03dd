use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::Result;
use crate::types::{TriggerRequest, TriggerResponse};

/// Carries trigger requests to a [`TriggerService`](super::TriggerService).
#[async_trait]
pub trait TriggerTransport: Send + Sync {
    /// Block until the service is reachable; `None` waits indefinitely.
    async fn wait_for_service(&self, timeout: Option<Duration>) -> Result<()>;

    async fn call(&self, request: TriggerRequest) -> Result<TriggerResponse>;
}

/// Thin wrapper turning start/stop into service calls.
///
/// Transport failures never escape as errors; they come back as
/// `(false, message)` like a rejected request.
pub struct TriggerClient<T> {
    transport: T,
    wait_timeout: Option<Duration>,
}

impl<T: TriggerTransport> TriggerClient<T> {
    pub fn new(transport: T, wait_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            wait_timeout,
        }
    }

    pub async fn request_start(&self, outname: &str, fps: f64, size: (u32, u32)) -> (bool, String) {
        self.send(TriggerRequest::start(outname, fps, size)).await
    }

    pub async fn request_stop(&self) -> (bool, String) {
        self.send(TriggerRequest::stop()).await
    }

    async fn send(&self, request: TriggerRequest) -> (bool, String) {
        let on = request.on;
        let result = async {
            self.transport.wait_for_service(self.wait_timeout).await?;
            self.transport.call(request).await
        }
        .await;

        match result {
            Ok(response) => {
                debug!("Trigger on={} answered: {}", on, response.message);
                response.into_tuple()
            }
            Err(e) => {
                error!("Service call failed: {}", e);
                (false, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Topic;
    use crate::error::AcquisitionError;
    use crate::recorder::VideoOptions;
    use crate::trigger::{spawn_local, TriggerService};
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    struct Unreachable;

    #[async_trait]
    impl TriggerTransport for Unreachable {
        async fn wait_for_service(&self, _timeout: Option<Duration>) -> Result<()> {
            Err(AcquisitionError::Transport("no route to camera_service".into()))
        }

        async fn call(&self, _request: TriggerRequest) -> Result<TriggerResponse> {
            unreachable!("call after failed wait")
        }
    }

    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<TriggerRequest>>,
    }

    #[async_trait]
    impl TriggerTransport for Recording {
        async fn wait_for_service(&self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }

        async fn call(&self, request: TriggerRequest) -> Result<TriggerResponse> {
            self.requests.lock().push(request);
            Ok(TriggerResponse::ok("fine"))
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_as_false() {
        let client = TriggerClient::new(Unreachable, Some(Duration::from_millis(10)));
        let (success, message) = client.request_stop().await;
        assert!(!success);
        assert!(message.contains("camera_service"));
    }

    #[tokio::test]
    async fn test_requests_are_built_from_arguments() {
        let client = TriggerClient::new(Recording::default(), None);
        assert_eq!(
            client.request_start("clip", 14.0, (1280, 800)).await,
            (true, "fine".to_string())
        );
        client.request_stop().await;

        let requests = client.transport.requests.lock();
        assert!(requests[0].on);
        assert_eq!(requests[0].outname.as_deref(), Some("clip"));
        assert_eq!(requests[0].size, Some((1280, 800)));
        assert!(!requests[1].on);
        assert_eq!(requests[1].outname, None);
    }

    #[tokio::test]
    async fn test_round_trip_through_local_service() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("test2");
        let shutdown = CancellationToken::new();
        let service = TriggerService::new(Topic::new("image"), VideoOptions::default());
        let (transport, handle) = spawn_local(service, shutdown.clone());
        let client = TriggerClient::new(transport, Some(Duration::from_secs(1)));

        let (started, _) = client
            .request_start(outname.to_str().unwrap(), 14.0, (1280, 800))
            .await;
        assert!(started);
        assert!(client.request_stop().await.0);
        assert!(!client.request_stop().await.0);
        assert!(dir.path().join("test2.avi").exists());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
