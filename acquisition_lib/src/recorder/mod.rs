//! Recorders started and stopped in lockstep with motion phases.
//!
//! Each recorder subscribes to its topic on `start` and hands the receiver to
//! a worker that owns the output exclusively. `stop` unsubscribes first, so
//! the worker drains what is buffered, releases its output and exits before
//! `stop` returns.

pub mod avi;
pub mod event;
pub mod joint;
pub mod video;

pub use avi::MjpegAviWriter;
pub use event::EventTimestampRecorder;
pub use joint::{JointSampleRecord, JointStateRecorder};
pub use video::{ClipSummary, VideoOptions, VideoRecorder};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{AcquisitionError, Result};

pub const TIMESTAMP_HEADER: &str = "# timestamps [s]";

/// Text log of timestamps in seconds, one per line after a header line.
pub struct TimestampLog {
    writer: BufWriter<File>,
    path: PathBuf,
    lines: u64,
}

impl TimestampLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| AcquisitionError::io(path, e))?;
        let mut log = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            lines: 0,
        };
        writeln!(log.writer, "{}", TIMESTAMP_HEADER)
            .and_then(|_| log.writer.flush())
            .map_err(|e| AcquisitionError::io(path, e))?;
        Ok(log)
    }

    pub fn append(&mut self, seconds: f64) -> Result<()> {
        writeln!(self.writer, "{:.6}", seconds).map_err(|e| AcquisitionError::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and close the log.
    pub fn close(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| AcquisitionError::io(&self.path, e))?;
        Ok(self.lines)
    }
}

/// `<outname>.<extension>`, keeping any dots already in `outname`.
pub(crate) fn output_path(outname: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", outname, extension))
}
