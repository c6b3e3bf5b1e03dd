use super::{Topic, TopicConfig};
use crate::types::{CameraFrame, JointCommand, JointState};

/// The named channels used during acquisition for one limb.
///
/// Cloning shares the underlying topics.
#[derive(Clone)]
pub struct AcquisitionBus {
    pub frames: Topic<CameraFrame>,
    pub flash: Topic<f64>,
    pub joint_states: Topic<JointState>,
    pub publish_rate: Topic<u16>,
    pub cfg_des: Topic<JointCommand>,
    pub pose_des: Topic<JointCommand>,
}

impl AcquisitionBus {
    pub fn new(limb: &str, camera: &str) -> Self {
        let ns = format!("data/limb/{}", limb);
        Self {
            frames: Topic::with_config(
                TopicConfig::new(format!("cameras/{}/image", camera)).buffer_size(None),
            ),
            flash: Topic::with_config(TopicConfig::new("data/head/flash_white").buffer_size(None)),
            joint_states: Topic::with_config(
                TopicConfig::new("robot/joint_states").buffer_size(None),
            ),
            publish_rate: Topic::with_config(
                TopicConfig::new("robot/joint_state_publish_rate").latch(true),
            ),
            cfg_des: Topic::with_config(TopicConfig::new(format!("{}/cfg/des", ns)).buffer_size(None)),
            pose_des: Topic::with_config(
                TopicConfig::new(format!("{}/pose/des", ns)).buffer_size(None),
            ),
        }
    }
}
