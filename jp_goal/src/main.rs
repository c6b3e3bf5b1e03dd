use acquisition_lib::comm::zenoh::{forward_from_zenoh, forward_to_zenoh, open_session};
use acquisition_lib::{
    init_tracing, AcquisitionBus, AcquisitionConfig, PoseSampler, RecordingSession, SimulatedArm,
};
use clap::Parser;
use eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "jp_goal")]
#[command(about = "Record joint position data during goal oriented motions")]
struct Cli {
    /// The limb to record data from
    #[arg(short, long, value_parser = ["left", "right"])]
    limb: String,

    /// The number of samples to record
    #[arg(short, long)]
    number: usize,

    /// Whether images are to be recorded
    #[arg(short, long)]
    images: bool,

    /// Whether head screen flash events are to be recorded
    #[arg(short, long)]
    flash: bool,

    /// Configuration file (defaults to $ACQUISITION_CONFIG or config/acquisition.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Bridge telemetry and flash events over zenoh
    #[arg(long)]
    zenoh: bool,

    /// Zenoh JSON5 configuration file
    #[arg(long, default_value = "config/zenoh.json5")]
    zenoh_config: String,

    /// Path and file name of the output files, without extension
    outfile: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let config_path = AcquisitionConfig::resolve_path(cli.config.as_deref());
    let mut config = AcquisitionConfig::load_or_default(&config_path)?;
    config.arm.limb = cli.limb.clone();
    config.flash.enabled |= cli.flash;
    config.validate()?;

    let bus = AcquisitionBus::new(&config.arm.limb, &config.camera.name);
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current sample");
                token.cancel();
            }
        });
    }

    // the session must outlive the bridges
    let zenoh = if cli.zenoh {
        Some(open_session(Some(cli.zenoh_config.as_str())).await?)
    } else {
        None
    };
    let mut bridges = Vec::new();
    if let Some(session) = &zenoh {
        for topic in [&bus.cfg_des, &bus.pose_des] {
            bridges.push(forward_to_zenoh(session, topic, &topic.name(), shutdown.clone()).await?);
        }
        let states = &bus.joint_states;
        bridges.push(forward_to_zenoh(session, states, &states.name(), shutdown.clone()).await?);
        if config.flash.enabled {
            let flash = bus.flash.clone();
            let key = flash.name();
            bridges.push(forward_from_zenoh(session, &key, flash, shutdown.clone()).await?);
        }
    }

    let sampler = PoseSampler::from_config(&config)?;
    info!("Pose table holds {} candidates", sampler.table().len());

    let arm = SimulatedArm::new(&config, &bus);
    let mut session = RecordingSession::new(config, arm, bus, sampler, shutdown.clone())
        .with_samples(cli.number)
        .with_images(cli.images);

    if let Err(e) = session.initialize().await {
        error!("Initialization failed: {}", e);
        session.shutdown().await;
        return Err(e.into());
    }

    let report = session.execute(&cli.outfile).await?;
    info!(
        "Done with experiment: {} recorded, {} aborted{}",
        report.recorded,
        report.aborted,
        if report.interrupted { ", interrupted" } else { "" }
    );

    for bridge in bridges {
        if let Err(e) = bridge.await {
            warn!("Zenoh bridge task failed: {}", e);
        }
    }
    Ok(())
}
