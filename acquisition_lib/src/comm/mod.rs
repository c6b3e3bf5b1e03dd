//! Channels between acquisition components.
//!
//! [`Topic`] is the in-process publish-subscribe hub, [`AcquisitionBus`] names
//! the topics of one limb, and [`zenoh`] carries topics and the trigger RPC
//! across processes.

mod bus;
mod topic;
pub mod zenoh;

pub use bus::AcquisitionBus;
pub use topic::{Subscription, Topic, TopicConfig};
