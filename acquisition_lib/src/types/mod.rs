pub mod camera;
pub mod config;
pub mod joint_state;
pub mod pose;
pub mod trigger;

pub use camera::*;
pub use config::*;
pub use joint_state::*;
pub use pose::*;
pub use trigger::*;
