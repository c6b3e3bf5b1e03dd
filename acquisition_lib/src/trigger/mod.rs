//! Remote start/stop of a camera recording.
//!
//! [`TriggerService`] owns at most one [`VideoRecorder`] and moves between
//! idle and recording on validated requests. [`TriggerClient`] issues requests
//! through any [`TriggerTransport`]: in-process ([`LocalTrigger`]) or zenoh
//! ([`crate::comm::zenoh::ZenohTrigger`]).
//!
//! [`VideoRecorder`]: crate::recorder::VideoRecorder

mod client;
mod service;

pub use client::{TriggerClient, TriggerTransport};
pub use service::{serve, spawn_local, LocalTrigger, TriggerCall, TriggerService};
