use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{output_path, MjpegAviWriter, TimestampLog};
use crate::comm::{Subscription, Topic};
use crate::error::{AcquisitionError, Result};
use crate::types::{CameraFrame, CameraParameters};
use crate::utils::now_secs;

#[derive(Debug, Clone, Copy)]
pub struct VideoOptions {
    /// Also write `<outname>.txt` with the arrival time of every frame
    pub timestamp_log: bool,
    pub jpeg_quality: u8,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            timestamp_log: false,
            jpeg_quality: 90,
        }
    }
}

/// Result of one finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSummary {
    pub path: PathBuf,
    pub frames: u64,
}

/// Records frames from the image channel into an MJPEG AVI file.
pub struct VideoRecorder {
    frames: Topic<CameraFrame>,
    options: VideoOptions,
    active: Option<ActiveClip>,
    last_clip: Option<ClipSummary>,
}

struct ActiveClip {
    path: PathBuf,
    subscription: Subscription<CameraFrame>,
    worker: JoinHandle<Result<u64>>,
}

impl VideoRecorder {
    pub fn new(frames: Topic<CameraFrame>, options: VideoOptions) -> Self {
        Self {
            frames,
            options,
            active: None,
            last_clip: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the clip currently being written
    pub fn output(&self) -> Option<&PathBuf> {
        self.active.as_ref().map(|clip| &clip.path)
    }

    pub fn last_clip(&self) -> Option<&ClipSummary> {
        self.last_clip.as_ref()
    }

    /// Open `<outname>.avi` and subscribe to the image channel.
    ///
    /// Returns whether the video writer is open. Failing to open the writer is
    /// an error, never a `false` return.
    pub fn start(&mut self, outname: &str, params: CameraParameters) -> Result<bool> {
        if let Some(clip) = &self.active {
            return Err(AcquisitionError::InvalidState(format!(
                "already recording to {}",
                clip.path.display()
            )));
        }
        params.validate()?;

        let path = output_path(outname, "avi");
        let writer = MjpegAviWriter::create(&path, params).map_err(|e| {
            error!("start - Problem with opening video writer {}: {}", path.display(), e);
            e
        })?;

        let stamps = if self.options.timestamp_log {
            let stamp_path = output_path(outname, "txt");
            Some(TimestampLog::create(&stamp_path).map_err(|e| {
                error!("start - Problem with opening text file: {}", e);
                e
            })?)
        } else {
            None
        };

        let opened = writer.is_opened();
        let subscription = self.frames.subscribe();
        let rx = subscription.receiver();
        let quality = self.options.jpeg_quality;
        let worker =
            tokio::task::spawn_blocking(move || write_clip(rx, writer, stamps, params, quality));

        info!(
            "Recording {} into {} ({}x{} @ {} fps)",
            subscription.topic_name(),
            path.display(),
            params.width,
            params.height,
            params.fps
        );
        self.active = Some(ActiveClip {
            path,
            subscription,
            worker,
        });
        Ok(opened)
    }

    /// Unsubscribe from the image channel, then release the video writer.
    ///
    /// Returns whether the writer is still open, which is `false` whenever
    /// this returns `Ok`. Safe to call when `start` never ran or failed. A
    /// conversion or write failure that stopped the recording mid-stream is
    /// returned here; the writer is released regardless.
    pub async fn stop(&mut self) -> Result<bool> {
        let Some(mut clip) = self.active.take() else {
            return Ok(false);
        };

        debug!("unregistering ...");
        clip.subscription.unsubscribe();
        debug!("unregistered");

        debug!("releasing video clip ...");
        let frames = clip
            .worker
            .await
            .map_err(|e| AcquisitionError::Encode(format!("video worker failed: {}", e)))??;
        info!("released {} ({} frames)", clip.path.display(), frames);

        self.last_clip = Some(ClipSummary {
            path: clip.path,
            frames,
        });
        Ok(false)
    }
}

/// Consumer side of a recording: owns the writer until the channel closes.
fn write_clip(
    rx: flume::Receiver<CameraFrame>,
    mut writer: MjpegAviWriter,
    mut stamps: Option<TimestampLog>,
    params: CameraParameters,
    quality: u8,
) -> Result<u64> {
    let streamed = rx
        .iter()
        .try_for_each(|frame| add_image(&mut writer, stamps.as_mut(), &frame, &params, quality));
    // no further frames reach a failed recording
    drop(rx);

    let released = writer.finish();
    let closed = stamps.map(TimestampLog::close).transpose();

    streamed?;
    closed?;
    released
}

fn add_image(
    writer: &mut MjpegAviWriter,
    stamps: Option<&mut TimestampLog>,
    frame: &CameraFrame,
    params: &CameraParameters,
    quality: u8,
) -> Result<()> {
    let received = now_secs();

    let image = frame.to_rgb_image().map_err(|e| {
        error!("add_image - Problem with image message conversion: {}", e);
        e
    })?;
    if image.dimensions() != params.frame_size() {
        let err = AcquisitionError::Conversion(format!(
            "frame {} is {}x{}, recording expects {}x{}",
            frame.frame_id,
            image.width(),
            image.height(),
            params.width,
            params.height
        ));
        error!("add_image - Problem with image message conversion: {}", err);
        return Err(err);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .map_err(|e| {
            error!("add_image - Recording frame failed: {}", e);
            AcquisitionError::Encode(format!("frame {}: {}", frame.frame_id, e))
        })?;

    writer.write_frame(&jpeg).map_err(|e| {
        error!("add_image - Recording frame failed: {}", e);
        e
    })?;

    if let Some(stamps) = stamps {
        stamps.append(received)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_u32(bytes: &[u8], fourcc: &[u8; 4], field: usize) -> u32 {
        let start = bytes.windows(4).position(|w| w == fourcc).unwrap() + 8;
        u32::from_le_bytes(bytes[start + field..start + field + 4].try_into().unwrap())
    }

    fn frame(width: u32, height: u32) -> CameraFrame {
        CameraFrame::rgb8(0, width, height, vec![128; (width * height * 3) as usize])
    }

    #[tokio::test]
    async fn test_records_published_frames() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("clip-0");
        let topic = Topic::new("image");
        let mut recorder = VideoRecorder::new(topic.clone(), VideoOptions::default());

        let opened = recorder
            .start(outname.to_str().unwrap(), CameraParameters::new(14.0, 32, 16))
            .unwrap();
        assert!(opened);
        for _ in 0..3 {
            topic.publish(frame(32, 16));
        }
        assert!(!recorder.stop().await.unwrap());
        assert_eq!(recorder.last_clip().unwrap().frames, 3);

        let bytes = std::fs::read(dir.path().join("clip-0.avi")).unwrap();
        assert_eq!(chunk_u32(&bytes, b"strf", 4), 32);
        assert_eq!(chunk_u32(&bytes, b"strf", 8), 16);
        assert_eq!(chunk_u32(&bytes, b"strh", 24), 14);
    }

    #[tokio::test]
    async fn test_burst_is_recorded_completely() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("burst");
        let bus = crate::comm::AcquisitionBus::new("left", "head_camera");
        let mut recorder = VideoRecorder::new(bus.frames.clone(), VideoOptions::default());

        recorder
            .start(outname.to_str().unwrap(), CameraParameters::new(30.0, 160, 120))
            .unwrap();
        for _ in 0..200 {
            bus.frames.publish(frame(160, 120));
        }
        recorder.stop().await.unwrap();
        assert_eq!(recorder.last_clip().unwrap().frames, 200);
    }

    #[tokio::test]
    async fn test_stop_without_frames_closes_writer() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("idle");
        let mut recorder = VideoRecorder::new(Topic::new("image"), VideoOptions::default());

        recorder
            .start(outname.to_str().unwrap(), CameraParameters::new(14.0, 16, 16))
            .unwrap();
        assert!(!recorder.stop().await.unwrap());
        assert!(!recorder.is_recording());
        assert_eq!(recorder.last_clip().unwrap().frames, 0);
        assert!(dir.path().join("idle.avi").exists());
    }

    #[tokio::test]
    async fn test_unopenable_path_fails_and_stop_is_safe() {
        let topic = Topic::new("image");
        let mut recorder = VideoRecorder::new(topic.clone(), VideoOptions::default());

        let err = recorder
            .start("/nonexistent-dir/sub/clip", CameraParameters::new(14.0, 16, 16))
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Io { .. }));
        assert_eq!(topic.subscriber_count(), 0);
        assert!(!recorder.stop().await.unwrap());
        assert!(!recorder.stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_frame_size_surfaces_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("bad");
        let topic = Topic::new("image");
        let mut recorder = VideoRecorder::new(topic.clone(), VideoOptions::default());

        recorder
            .start(outname.to_str().unwrap(), CameraParameters::new(14.0, 16, 16))
            .unwrap();
        topic.publish(frame(8, 8));
        let err = recorder.stop().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Conversion(_)));
        assert!(!recorder.is_recording());
        // writer was still released
        assert!(dir.path().join("bad.avi").exists());
        assert!(recorder.last_clip().is_none());
    }

    #[tokio::test]
    async fn test_timestamp_log_option() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("stamped");
        let topic = Topic::new("image");
        let options = VideoOptions {
            timestamp_log: true,
            ..VideoOptions::default()
        };
        let mut recorder = VideoRecorder::new(topic.clone(), options);

        recorder
            .start(outname.to_str().unwrap(), CameraParameters::new(14.0, 16, 16))
            .unwrap();
        topic.publish(frame(16, 16));
        topic.publish(frame(16, 16));
        recorder.stop().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("stamped.txt")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "# timestamps [s]");
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outname = dir.path().join("twice");
        let mut recorder = VideoRecorder::new(Topic::new("image"), VideoOptions::default());
        let params = CameraParameters::new(14.0, 16, 16);

        recorder.start(outname.to_str().unwrap(), params).unwrap();
        assert!(matches!(
            recorder.start(outname.to_str().unwrap(), params),
            Err(AcquisitionError::InvalidState(_))
        ));
        recorder.stop().await.unwrap();
    }
}
