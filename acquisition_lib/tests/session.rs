use acquisition_lib::recorder::JointSampleRecord;
use acquisition_lib::{
    AcquisitionBus, AcquisitionConfig, CameraFrame, PoseSampler, RecordingSession, Robot,
    SessionReport, SimulatedArm,
};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config() -> AcquisitionConfig {
    let mut config = AcquisitionConfig::default();
    config.simulation.motion_secs = 0.05;
    config.camera.width = 16;
    config.camera.height = 16;
    config.camera.fps = 20.0;
    config.poses.count = 5;
    config.poses.seed = Some(11);
    config
}

fn build(
    config: &AcquisitionConfig,
    samples: usize,
    images: bool,
) -> (RecordingSession<SimulatedArm>, AcquisitionBus, CancellationToken) {
    let bus = AcquisitionBus::new(&config.arm.limb, &config.camera.name);
    let arm = SimulatedArm::new(config, &bus);
    let sampler = PoseSampler::from_config(config).unwrap();
    let shutdown = CancellationToken::new();
    let session = RecordingSession::new(config.clone(), arm, bus.clone(), sampler, shutdown.clone())
        .with_samples(samples)
        .with_images(images);
    (session, bus, shutdown)
}

/// Little-endian field `field` bytes into the first `fourcc` chunk's data
fn chunk_u32(bytes: &[u8], fourcc: &[u8; 4], field: usize) -> u32 {
    let start = bytes.windows(4).position(|w| w == fourcc).unwrap() + 8;
    u32::from_le_bytes(bytes[start + field..start + field + 4].try_into().unwrap())
}

fn read_records(path: &Path) -> Vec<JointSampleRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_three_samples_with_images() {
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("jp");
    let config = fast_config();
    let (mut session, bus, shutdown) = build(&config, 3, true);

    session.initialize().await.unwrap();
    let report = session.execute(outfile.to_str().unwrap()).await.unwrap();
    assert_eq!(
        report,
        SessionReport {
            recorded: 3,
            aborted: 0,
            interrupted: false
        }
    );

    let records = read_records(&dir.path().join("jp.jsonl"));
    assert_eq!(records.len(), 3);
    for (nr, record) in records.iter().enumerate() {
        assert_eq!(record.sample, nr);
        assert_eq!(record.header_cfg[0], "time");
        assert_eq!(record.header_cfg[1], "left_s0");
        assert!(!record.measured_cfg.is_empty());
        assert_eq!(record.desired_cfg.len(), 1);
        assert_eq!(record.desired_cfg[0].len(), 8);
        assert_eq!(record.desired_pose.len(), 1);
        assert_eq!(record.desired_pose[0].len(), 8);
    }

    for nr in 0..3 {
        let bytes = std::fs::read(dir.path().join(format!("jp-{}.avi", nr))).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(chunk_u32(&bytes, b"strf", 4), 16);
        assert_eq!(chunk_u32(&bytes, b"strf", 8), 16);
        assert_eq!(chunk_u32(&bytes, b"strh", 20), 1);
        assert_eq!(chunk_u32(&bytes, b"strh", 24), 20);
    }
    assert!(!dir.path().join("jp-3.avi").exists());

    // shutdown restored the robot and signalled termination
    assert!(shutdown.is_cancelled());
    assert!(!session.robot().is_enabled().await.unwrap());
    assert_eq!(bus.publish_rate.latched(), Some(100));
    assert!(!session.robot().camera("right_hand_camera").unwrap().is_open());
    assert_eq!(bus.frames.subscriber_count(), 0);
}

#[tokio::test]
async fn test_flash_events_logged_per_sample() {
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("flash");
    let mut config = fast_config();
    config.flash.enabled = true;
    let (mut session, bus, shutdown) = build(&config, 2, false);

    let flashes = {
        let flash = bus.flash.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let mut stamp = 0.0;
            while !token.is_cancelled() {
                flash.publish(stamp);
                stamp += 0.5;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    session.initialize().await.unwrap();
    let report = session.execute(outfile.to_str().unwrap()).await.unwrap();
    flashes.await.unwrap();
    assert_eq!(report.recorded, 2);

    for nr in 0..2 {
        let content =
            std::fs::read_to_string(dir.path().join(format!("flash-{}-flash.txt", nr))).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("# timestamps [s]"));
        let stamps: Vec<f64> = lines.map(|l| l.parse().unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }
    // no video without images
    assert!(!dir.path().join("flash-0.avi").exists());
}

#[tokio::test]
async fn test_interrupt_ends_loop_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("interrupted");
    let mut config = fast_config();
    config.simulation.motion_secs = 0.5;
    let (mut session, _bus, shutdown) = build(&config, 10, true);

    session.initialize().await.unwrap();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
    }

    let report = session.execute(outfile.to_str().unwrap()).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.recorded, 0);
    assert!(!dir.path().join("interrupted.jsonl").exists());
    assert!(!session.robot().is_enabled().await.unwrap());

    let neutral = &config.arm.neutral;
    let position = session.robot().position();
    assert!(position.iter().zip(neutral).all(|(p, n)| (p - n).abs() < 1e-9));
}

#[tokio::test]
async fn test_bad_frames_abort_only_their_sample() {
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("bad");
    let config = fast_config();
    let (mut session, bus, shutdown) = build(&config, 2, true);

    let intruder = {
        let frames = bus.frames.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            while !token.is_cancelled() {
                frames.publish(CameraFrame::rgb8(0, 2, 2, vec![0; 12]));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    session.initialize().await.unwrap();
    let report = session.execute(outfile.to_str().unwrap()).await.unwrap();
    intruder.await.unwrap();

    assert_eq!(report.recorded, 0);
    assert_eq!(report.aborted, 2);
    assert!(!report.interrupted);
    // joint samples of failed cycles are discarded
    assert!(!dir.path().join("bad.jsonl").exists());
    // the clips were still released
    assert!(dir.path().join("bad-0.avi").exists());
    assert!(dir.path().join("bad-1.avi").exists());
}
