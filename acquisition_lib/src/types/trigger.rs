use serde::{Deserialize, Serialize};

use super::CameraParameters;
use crate::error::{AcquisitionError, Result};

/// Wire form of a trigger call.
///
/// `outname`, `fps` and `size` only carry meaning when `on` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
}

/// A trigger request after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerCommand {
    Start {
        output_name: String,
        params: CameraParameters,
    },
    Stop,
}

impl TriggerRequest {
    pub fn start(outname: impl Into<String>, fps: f64, size: (u32, u32)) -> Self {
        Self {
            on: true,
            outname: Some(outname.into()),
            fps: Some(fps),
            size: Some(size),
        }
    }

    pub fn stop() -> Self {
        Self {
            on: false,
            outname: None,
            fps: None,
            size: None,
        }
    }

    /// Checks the fields required by the requested transition.
    pub fn validate(self) -> Result<TriggerCommand> {
        if !self.on {
            return Ok(TriggerCommand::Stop);
        }

        let output_name = self
            .outname
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AcquisitionError::InvalidRequest("missing output name".into()))?;
        let fps = self
            .fps
            .ok_or_else(|| AcquisitionError::InvalidRequest("missing frame rate".into()))?;
        let (width, height) = self
            .size
            .ok_or_else(|| AcquisitionError::InvalidRequest("missing frame size".into()))?;

        let params = CameraParameters::new(fps, width, height);
        params
            .validate()
            .map_err(|e| AcquisitionError::InvalidRequest(e.to_string()))?;

        Ok(TriggerCommand::Start {
            output_name,
            params,
        })
    }
}

impl TriggerResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn into_tuple(self) -> (bool, String) {
        (self.success, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_needs_no_fields() {
        assert_eq!(TriggerRequest::stop().validate().unwrap(), TriggerCommand::Stop);
    }

    #[test]
    fn test_start_is_validated() {
        let cmd = TriggerRequest::start("test2", 14.0, (1280, 800))
            .validate()
            .unwrap();
        assert_eq!(
            cmd,
            TriggerCommand::Start {
                output_name: "test2".into(),
                params: CameraParameters::new(14.0, 1280, 800),
            }
        );

        let mut missing = TriggerRequest::start("x", 14.0, (1280, 800));
        missing.size = None;
        assert!(matches!(
            missing.validate(),
            Err(AcquisitionError::InvalidRequest(_))
        ));

        assert!(TriggerRequest::start("", 14.0, (1280, 800)).validate().is_err());
        assert!(TriggerRequest::start("x", -1.0, (1280, 800)).validate().is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&TriggerRequest::stop()).unwrap();
        assert_eq!(json, r#"{"on":false}"#);

        let req: TriggerRequest =
            serde_json::from_str(r#"{"on":true,"outname":"a","fps":14,"size":[1280,800]}"#)
                .unwrap();
        assert_eq!(req.size, Some((1280, 800)));
        assert_eq!(req.fps, Some(14.0));
    }
}
