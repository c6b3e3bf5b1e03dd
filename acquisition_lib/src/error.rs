//! Error taxonomy for data acquisition.
//!
//! Every fallible operation in the library returns [`AcquisitionError`]. The
//! variants are grouped by [`ErrorClass`] so that the recording session can
//! decide what a failure means for the run:
//!
//! - **Interrupted**: an external shutdown signal was observed. The loop ends
//!   and the regular shutdown path runs; nothing is reported as an error.
//! - **SampleFailure**: a recorder could not open its output, or a frame could
//!   not be converted or written. The current sample is discarded, the next
//!   one is attempted.
//! - **Transport**: a remote call failed. Reported to the caller as
//!   `(false, message)`, the caller continues.
//! - **Fatal**: anything else (robot failures, bad configuration). The loop
//!   ends, best-effort shutdown runs, the error propagates.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcquisitionError>;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Interrupted by shutdown signal")]
    Interrupted,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame conversion failed: {0}")]
    Conversion(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Robot error: {0}")]
    Robot(String),

    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    #[error("Pose candidate set is empty")]
    EmptyCandidateSet,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How a failure affects the surrounding acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Interrupted,
    SampleFailure,
    Transport,
    Fatal,
}

impl AcquisitionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Interrupted => ErrorClass::Interrupted,
            Self::Io { .. } | Self::Conversion(_) | Self::Encode(_) => ErrorClass::SampleFailure,
            Self::Transport(_) => ErrorClass::Transport,
            _ => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(AcquisitionError::Interrupted.class(), ErrorClass::Interrupted);
        let io = AcquisitionError::io(
            "/nope/clip.avi",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(io.class(), ErrorClass::SampleFailure);
        assert_eq!(
            AcquisitionError::Conversion("bad".into()).class(),
            ErrorClass::SampleFailure
        );
        assert_eq!(
            AcquisitionError::Transport("down".into()).class(),
            ErrorClass::Transport
        );
        assert_eq!(AcquisitionError::Robot("gone".into()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_io_message_names_path() {
        let err = AcquisitionError::io(
            "/tmp/out.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out.txt"));
    }
}
