//! # Acquisition Library
//!
//! Synchronized data acquisition for a robotic arm: joint-state, video and
//! flash-event recorders started and stopped in lockstep with motions, a
//! remote start/stop service for camera recordings, and the session that
//! drives goal-oriented motions between sampled target configurations.

pub mod comm;
pub mod error;
pub mod recorder;
pub mod robot;
pub mod sampler;
pub mod session;
pub mod trigger;
pub mod types;
pub mod utils;

// Re-export everything for convenience
pub use comm::{AcquisitionBus, Subscription, Topic, TopicConfig};
pub use error::{AcquisitionError, ErrorClass, Result};
pub use recorder::{EventTimestampRecorder, JointStateRecorder, VideoOptions, VideoRecorder};
pub use robot::{Robot, SimulatedArm, SimulatedCamera};
pub use sampler::{PoseSampler, PoseTable};
pub use session::{RecordingSession, SessionReport};
pub use trigger::{TriggerClient, TriggerService, TriggerTransport};
pub use types::*;
pub use utils::*;
