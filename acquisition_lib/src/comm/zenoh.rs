//! Zenoh links: topic bridges and the trigger RPC.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zenoh::{Config, Session};

use super::Topic;
use crate::error::{AcquisitionError, Result};
use crate::trigger::{spawn_local, TriggerService, TriggerTransport};
use crate::types::{TriggerRequest, TriggerResponse};

const LIVELINESS_POLL: Duration = Duration::from_millis(250);

fn transport_err(what: &str, e: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::Transport(format!("{}: {}", what, e))
}

/// Key expression of a trigger service, shared by its queryable and
/// liveliness token.
pub fn service_key(service_name: &str) -> String {
    format!("acquisition/service/{}", service_name.trim_matches('/'))
}

/// Open a zenoh session from a JSON5 config file, or in peer mode when the
/// file is absent.
pub async fn open_session(config_path: Option<&str>) -> Result<Session> {
    let config = match config_path {
        Some(path) if std::path::Path::new(path).exists() => {
            info!("Loading Zenoh config from: {}", path);
            Config::from_file(path).map_err(|e| transport_err(path, e))?
        }
        other => {
            if let Some(path) = other {
                warn!("Zenoh config not found at {}, using peer mode", path);
            }
            let mut config = Config::default();
            config
                .insert_json5("mode", "\"peer\"")
                .map_err(|e| transport_err("zenoh mode", e))?;
            config
        }
    };

    let session = zenoh::open(config)
        .await
        .map_err(|e| transport_err("open zenoh session", e))?;
    info!("Zenoh session ID: {}", session.zid());
    Ok(session)
}

/// Publish every message of `topic` as JSON on `key` until `shutdown`.
pub async fn forward_to_zenoh<T>(
    session: &Session,
    topic: &Topic<T>,
    key: &str,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let publisher = session
        .declare_publisher(key.to_string())
        .await
        .map_err(|e| transport_err(key, e))?;
    let subscription = topic.subscribe();
    let rx = subscription.receiver();
    info!("Forwarding {} -> zenoh {}", topic.name(), key);

    Ok(tokio::spawn(async move {
        let _subscription = subscription;
        let mut forwarded: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv_async() => {
                    let Ok(message) = message else { break };
                    match serde_json::to_vec(&message) {
                        Ok(bytes) => {
                            if let Err(e) = publisher.put(bytes).await {
                                warn!("Failed to publish on {}: {}", publisher.key_expr(), e);
                            } else {
                                forwarded += 1;
                            }
                        }
                        Err(e) => error!("Failed to serialize message: {}", e),
                    }
                }
            }
        }
        debug!("Forwarder for {} stopped after {} messages", publisher.key_expr(), forwarded);
    }))
}

/// Decode JSON samples from `key` and publish them on `topic` until
/// `shutdown`. Undecodable samples are skipped.
pub async fn forward_from_zenoh<T>(
    session: &Session,
    key: &str,
    topic: Topic<T>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let subscriber = session
        .declare_subscriber(key.to_string())
        .await
        .map_err(|e| transport_err(key, e))?;
    info!("Forwarding zenoh {} -> {}", key, topic.name());

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sample = subscriber.recv_async() => {
                    let Ok(sample) = sample else { break };
                    let payload = sample.payload().to_bytes();
                    match serde_json::from_slice::<T>(&payload) {
                        Ok(message) => topic.publish(message),
                        Err(e) => warn!("Failed to parse sample on {}: {}", sample.key_expr(), e),
                    }
                }
            }
        }
    }))
}

fn decode_request(payload: Option<&[u8]>) -> Result<TriggerRequest> {
    let payload = payload
        .ok_or_else(|| AcquisitionError::InvalidRequest("trigger query without payload".into()))?;
    Ok(serde_json::from_slice(payload)?)
}

/// Serve `service` behind a zenoh queryable on [`service_key`] and announce
/// it with a liveliness token until `shutdown`.
pub async fn serve_trigger(
    session: &Session,
    service_name: &str,
    service: TriggerService,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let key = service_key(service_name);
    let queryable = session
        .declare_queryable(key.clone())
        .await
        .map_err(|e| transport_err(&key, e))?;
    let token = session
        .liveliness()
        .declare_token(key.clone())
        .await
        .map_err(|e| transport_err(&key, e))?;
    let (local, served) = spawn_local(service, shutdown.clone());
    info!("Trigger service '{}' ready on {}", service_name, key);

    Ok(tokio::spawn(async move {
        let _token = token;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                query = queryable.recv_async() => {
                    let Ok(query) = query else { break };
                    let payload = query.payload().map(|p| p.to_bytes());
                    let response = match decode_request(payload.as_deref()) {
                        Ok(request) => local
                            .call(request)
                            .await
                            .unwrap_or_else(|e| TriggerResponse::rejected(e.to_string())),
                        Err(e) => {
                            warn!("Rejected trigger query: {}", e);
                            TriggerResponse::rejected(e.to_string())
                        }
                    };
                    match serde_json::to_vec(&response) {
                        Ok(bytes) => {
                            if let Err(e) = query.reply(query.key_expr().clone(), bytes).await {
                                warn!("Failed to reply on {}: {}", query.key_expr(), e);
                            }
                        }
                        Err(e) => error!("Failed to serialize trigger response: {}", e),
                    }
                }
            }
        }
        if let Err(e) = served.await {
            error!("Trigger service task failed: {}", e);
        }
    }))
}

/// Trigger transport over a zenoh session.
pub struct ZenohTrigger {
    session: Session,
    key: String,
    call_timeout: Duration,
}

impl ZenohTrigger {
    pub fn new(session: Session, service_name: &str, call_timeout: Duration) -> Self {
        Self {
            session,
            key: service_key(service_name),
            call_timeout,
        }
    }

    async fn is_alive(&self) -> Result<bool> {
        let replies = self
            .session
            .liveliness()
            .get(self.key.as_str())
            .timeout(LIVELINESS_POLL)
            .await
            .map_err(|e| transport_err(&self.key, e))?;
        while let Ok(reply) = replies.recv_async().await {
            if reply.result().is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl TriggerTransport for ZenohTrigger {
    async fn wait_for_service(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        info!("Waiting for service {} ...", self.key);
        loop {
            if self.is_alive().await? {
                debug!("Service {} is available", self.key);
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(AcquisitionError::Transport(format!(
                    "service {} not available",
                    self.key
                )));
            }
            tokio::time::sleep(LIVELINESS_POLL).await;
        }
    }

    async fn call(&self, request: TriggerRequest) -> Result<TriggerResponse> {
        let payload = serde_json::to_vec(&request)?;
        let replies = self
            .session
            .get(self.key.as_str())
            .payload(payload)
            .timeout(self.call_timeout)
            .await
            .map_err(|e| transport_err(&self.key, e))?;

        let reply = replies.recv_async().await.map_err(|_| {
            AcquisitionError::Transport(format!(
                "no reply from {} within {:?}",
                self.key, self.call_timeout
            ))
        })?;
        let sample = reply.result().map_err(|e| {
            AcquisitionError::Transport(format!(
                "{} replied with error: {}",
                self.key,
                String::from_utf8_lossy(&e.payload().to_bytes())
            ))
        })?;
        serde_json::from_slice(&sample.payload().to_bytes()).map_err(|e| {
            AcquisitionError::Transport(format!("undecodable reply from {}: {}", self.key, e))
        })
    }
}
