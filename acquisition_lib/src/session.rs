//! Goal-oriented joint position acquisition.
//!
//! A session moves one limb from neutral to a sampled target configuration
//! per sample while joint states, and optionally camera frames and flash
//! events, are recorded. Shutdown always returns the robot to neutral and
//! restores its enabled state.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::comm::AcquisitionBus;
use crate::error::{AcquisitionError, ErrorClass, Result};
use crate::recorder::{EventTimestampRecorder, JointStateRecorder, VideoOptions, VideoRecorder};
use crate::robot::Robot;
use crate::sampler::PoseSampler;
use crate::types::{command_from_header, AcquisitionConfig, Configuration, Pose};

/// Outcome of [`RecordingSession::execute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub recorded: usize,
    pub aborted: usize,
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Ready,
    ShuttingDown,
    Terminal,
}

pub struct RecordingSession<R: Robot> {
    config: AcquisitionConfig,
    robot: R,
    bus: AcquisitionBus,
    sampler: PoseSampler,
    shutdown: CancellationToken,
    samples: usize,
    images: bool,
    joints: JointStateRecorder,
    video: Option<VideoRecorder>,
    flash: Option<EventTimestampRecorder>,
    init_enabled: Option<bool>,
    state: SessionState,
}

async fn interruptible<F>(shutdown: &CancellationToken, motion: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        _ = shutdown.cancelled() => Err(AcquisitionError::Interrupted),
        result = motion => result,
    }
}

impl<R: Robot> RecordingSession<R> {
    pub fn new(
        config: AcquisitionConfig,
        robot: R,
        bus: AcquisitionBus,
        sampler: PoseSampler,
        shutdown: CancellationToken,
    ) -> Self {
        let joints = JointStateRecorder::new(&config.arm.limb, config.arm.joint_names(), &bus);
        let flash = config
            .flash
            .enabled
            .then(|| EventTimestampRecorder::new(bus.flash.clone()));
        Self {
            config,
            robot,
            bus,
            sampler,
            shutdown,
            samples: 1,
            images: false,
            joints,
            video: None,
            flash,
            init_enabled: None,
            state: SessionState::Uninitialized,
        }
    }

    /// Number of samples `execute` records
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Record a video clip per sample
    pub fn with_images(mut self, images: bool) -> Self {
        self.images = images;
        self
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn joint_recorder(&self) -> &JointStateRecorder {
        &self.joints
    }

    pub async fn initialize(&mut self) -> Result<()> {
        info!("Getting robot state ... ");
        self.init_enabled = Some(self.robot.is_enabled().await?);
        info!("Enabling robot... ");
        self.robot.enable().await?;

        self.robot
            .set_joint_position_speed(self.config.arm.joint_position_speed)
            .await?;
        self.bus.publish_rate.publish(self.config.recording.rate_hz);

        if self.images {
            if let Some(secondary) = &self.config.camera.secondary {
                match self.robot.close_camera(secondary).await {
                    Ok(()) => debug!("Closed secondary camera {}", secondary),
                    Err(AcquisitionError::CameraNotFound(_)) => {
                        debug!("No secondary camera {} to close", secondary)
                    }
                    Err(e) => warn!("Closing secondary camera {} failed: {}", secondary, e),
                }
            }
            self.robot
                .configure_camera(&self.config.camera.name, self.config.camera_parameters())
                .await?;

            let options = VideoOptions {
                timestamp_log: self.config.camera.timestamp_log,
                jpeg_quality: self.config.camera.jpeg_quality,
            };
            self.video = Some(VideoRecorder::new(self.bus.frames.clone(), options));
        }

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Record all samples into files prefixed with `outfile`, then shut down.
    pub async fn execute(&mut self, outfile: &str) -> Result<SessionReport> {
        let result = self.run(outfile).await;
        self.shutdown().await;
        result
    }

    async fn run(&mut self, outfile: &str) -> Result<SessionReport> {
        if self.state != SessionState::Ready {
            return Err(AcquisitionError::InvalidState(format!(
                "cannot record in state {:?}",
                self.state
            )));
        }

        info!("Record goal oriented motion data into {}.", outfile);
        let mut report = SessionReport::default();

        for nr in 0..self.samples {
            if self.shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }
            info!("Recording sample {} of {}.", nr + 1, self.samples);

            let Err(e) = self.record_sample(outfile, nr).await else {
                report.recorded += 1;
                continue;
            };
            match e.class() {
                ErrorClass::Interrupted => {
                    info!("Interrupted during sample {}", nr + 1);
                    report.interrupted = true;
                    break;
                }
                ErrorClass::SampleFailure | ErrorClass::Transport => {
                    error!("Sample {} aborted: {}", nr + 1, e);
                    report.aborted += 1;
                }
                ErrorClass::Fatal => {
                    error!("Sample {} failed: {}", nr + 1, e);
                    return Err(e);
                }
            }
        }

        info!(
            "Recorded {} sample(s), {} aborted",
            report.recorded, report.aborted
        );
        Ok(report)
    }

    async fn record_sample(&mut self, outfile: &str, nr: usize) -> Result<()> {
        interruptible(&self.shutdown, self.robot.move_to_neutral()).await?;
        let (idx, pose, cfg) = self.sampler.next()?;
        debug!("Sample {} targets candidate {}", nr, idx);

        let moved = match self.start_recorders(outfile, nr) {
            Ok(()) => self.move_to_sample(&pose, &cfg).await,
            Err(e) => Err(e),
        };
        // video is closed before the joint sample is finalized
        let stopped = self.stop_recorders().await;

        match moved.and(stopped) {
            Ok(()) => {
                self.joints.write_sample()?;
                Ok(())
            }
            Err(e) => {
                self.joints.discard_sample();
                Err(e)
            }
        }
    }

    fn start_recorders(&mut self, outfile: &str, nr: usize) -> Result<()> {
        self.joints.start(outfile)?;
        if let Some(video) = &mut self.video {
            video.start(&format!("{}-{}", outfile, nr), self.config.camera_parameters())?;
        }
        if let Some(flash) = &mut self.flash {
            flash.start(&format!("{}-{}-flash", outfile, nr))?;
        }
        Ok(())
    }

    async fn move_to_sample(&mut self, pose: &Pose, cfg: &Configuration) -> Result<()> {
        let pose_des = command_from_header(&self.joints.header_pose(), |k| pose.get(k))?;
        let cfg_des = command_from_header(&self.joints.header_cfg(), |j| cfg.get(j))?;
        self.bus.pose_des.publish(pose_des);
        self.bus.cfg_des.publish(cfg_des);

        interruptible(&self.shutdown, self.robot.move_to_joint_positions(cfg)).await
    }

    /// Stop every recorder, returning the first failure.
    async fn stop_recorders(&mut self) -> Result<()> {
        let mut first = None;

        if let Some(video) = &mut self.video {
            if let Err(e) = video.stop().await {
                error!("Stopping video recorder failed: {}", e);
                first.get_or_insert(e);
            }
        }
        if let Some(flash) = &mut self.flash {
            if let Err(e) = flash.stop().await {
                error!("Stopping flash recorder failed: {}", e);
                first.get_or_insert(e);
            }
        }
        if let Err(e) = self.joints.stop().await {
            error!("Stopping joint recorder failed: {}", e);
            first.get_or_insert(e);
        }

        first.map_or(Ok(()), Err)
    }

    /// Return to neutral and restore the robot's initial enabled state.
    ///
    /// Runs at most once; every step is attempted even if an earlier one
    /// fails.
    pub async fn shutdown(&mut self) {
        if matches!(self.state, SessionState::ShuttingDown | SessionState::Terminal) {
            return;
        }
        self.state = SessionState::ShuttingDown;
        info!("Exiting joint position goal oriented motion daq ...");

        if let Err(e) = self
            .robot
            .set_joint_position_speed(self.config.arm.joint_position_speed)
            .await
        {
            warn!("Restoring joint position speed failed: {}", e);
        }
        self.bus
            .publish_rate
            .publish(self.config.recording.shutdown_rate_hz);

        if let Err(e) = self.robot.move_to_neutral().await {
            warn!("Moving to neutral failed: {}", e);
        }
        if self.init_enabled == Some(false) {
            if let Err(e) = self.robot.disable().await {
                warn!("Disabling robot failed: {}", e);
            }
        }

        self.shutdown.cancel();
        self.state = SessionState::Terminal;
    }
}
