//! Motion-JPEG AVI output through GStreamer.
//!
//! Pipeline: `appsrc ! avimux ! filesink`. JPEG buffers are pushed with
//! presentation times taken from the frame rate. `avimux` rewrites the
//! headers on end-of-stream and switches to OpenDML indexes once a file
//! outgrows the classic RIFF limit.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{AcquisitionError, Result};
use crate::types::CameraParameters;

/// Frame sizes accepted by `avimux` for `image/jpeg`
pub const MUXER_SIZE_RANGE: std::ops::RangeInclusive<u32> = 16..=4096;

const EOS_TIMEOUT_SECS: u64 = 5;

fn pipeline_err(what: &str, e: impl std::fmt::Debug) -> AcquisitionError {
    AcquisitionError::Encode(format!("{}: {:?}", what, e))
}

pub struct MjpegAviWriter {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    path: PathBuf,
    rate: (u64, u64),
    frames: u64,
    released: bool,
}

impl MjpegAviWriter {
    pub fn create(path: &Path, params: CameraParameters) -> Result<Self> {
        for side in [params.width, params.height] {
            if !MUXER_SIZE_RANGE.contains(&side) {
                return Err(AcquisitionError::InvalidRequest(format!(
                    "frame size {}x{} outside {:?}",
                    params.width, params.height, MUXER_SIZE_RANGE
                )));
            }
        }
        gst::init().map_err(|e| pipeline_err("GStreamer init failed", e))?;

        // filesink only reports an unwritable location as a state change error
        File::create(path).map_err(|e| AcquisitionError::io(path, e))?;

        let (rate, scale) = rate_and_scale(params.fps);
        let caps = gst::Caps::builder("image/jpeg")
            .field("width", params.width as i32)
            .field("height", params.height as i32)
            .field("framerate", gst::Fraction::new(rate as i32, scale as i32))
            .build();

        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        let muxer = gst::ElementFactory::make("avimux")
            .build()
            .map_err(|e| pipeline_err("Failed to create avimux", e))?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().to_string())
            .property("async", false)
            .build()
            .map_err(|e| pipeline_err("Failed to create filesink", e))?;

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([appsrc.upcast_ref(), &muxer, &filesink])
            .map_err(|e| pipeline_err("Failed to add elements", e))?;
        gst::Element::link_many([appsrc.upcast_ref(), &muxer, &filesink])
            .map_err(|e| pipeline_err("Failed to link elements", e))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(pipeline_err("Failed to start pipeline", e));
        }
        debug!("avimux pipeline for {} started", path.display());

        Ok(Self {
            pipeline,
            appsrc,
            path: path.to_path_buf(),
            rate: (rate, scale),
            frames: 0,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_opened(&self) -> bool {
        !self.released
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn pts(&self, frame: u64) -> gst::ClockTime {
        let (rate, scale) = self.rate;
        let nanos = frame as u128 * 1_000_000_000 * scale as u128 / rate as u128;
        gst::ClockTime::from_nseconds(nanos as u64)
    }

    /// Append one JPEG-compressed frame.
    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        if self.released {
            return Err(AcquisitionError::InvalidState(format!(
                "video writer for {} is released",
                self.path.display()
            )));
        }
        if let Some(err) = self.pending_error() {
            return Err(err);
        }

        let pts = self.pts(self.frames);
        let duration = self.pts(self.frames + 1) - pts;
        let mut buffer = gst::Buffer::from_slice(jpeg.to_vec());
        if let Some(buffer_ref) = buffer.get_mut() {
            buffer_ref.set_pts(pts);
            buffer_ref.set_duration(duration);
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| pipeline_err("Failed to push buffer", e))?;
        self.frames += 1;
        Ok(())
    }

    /// Error the pipeline posted since the last check, if any
    fn pending_error(&self) -> Option<AcquisitionError> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(AcquisitionError::Encode(format!(
                "pipeline error: {} ({:?})",
                err.error(),
                err.debug()
            ))),
            _ => None,
        }
    }

    /// Send end-of-stream, wait for the muxer to finalize the file and stop
    /// the pipeline. Releasing twice is a no-op.
    pub fn finish(&mut self) -> Result<u64> {
        if self.released {
            return Ok(self.frames);
        }
        self.released = true;

        if let Err(e) = self.appsrc.end_of_stream() {
            warn!("Failed to send EOS to {}: {:?}", self.path.display(), e);
        }

        let mut outcome = Err(AcquisitionError::Encode(format!(
            "{} not finalized within {} s",
            self.path.display(),
            EOS_TIMEOUT_SECS
        )));
        if let Some(bus) = self.pipeline.bus() {
            for msg in bus.iter_timed(gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS)) {
                match msg.view() {
                    gst::MessageView::Eos(..) => {
                        outcome = Ok(self.frames);
                        break;
                    }
                    gst::MessageView::Error(err) => {
                        outcome = Err(AcquisitionError::Encode(format!(
                            "pipeline error: {} ({:?})",
                            err.error(),
                            err.debug()
                        )));
                        break;
                    }
                    _ => {}
                }
            }
        }

        let _ = self.pipeline.set_state(gst::State::Null);
        outcome
    }
}

impl Drop for MjpegAviWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Frame rate as a reduced `(rate, scale)` fraction, millisecond-precise.
fn rate_and_scale(fps: f64) -> (u64, u64) {
    let (rate, scale) = if fps.fract() == 0.0 {
        (fps as u64, 1)
    } else {
        ((fps * 1000.0).round() as u64, 1000)
    };
    let divisor = gcd(rate, scale).max(1);
    (rate / divisor, scale / divisor)
}
