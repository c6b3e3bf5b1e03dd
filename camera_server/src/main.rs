use acquisition_lib::comm::zenoh::{forward_from_zenoh, open_session, serve_trigger};
use acquisition_lib::{
    init_tracing, AcquisitionBus, AcquisitionConfig, SimulatedCamera, TriggerService, VideoOptions,
};
use clap::Parser;
use eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "camera_server")]
#[command(about = "Start and stop camera recordings on request")]
struct Cli {
    /// Configuration file (defaults to $ACQUISITION_CONFIG or config/acquisition.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Zenoh JSON5 configuration file
    #[arg(long, default_value = "config/zenoh.json5")]
    zenoh_config: String,

    /// Record synthetic frames instead of frames received over zenoh
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let config_path = AcquisitionConfig::resolve_path(cli.config.as_deref());
    let config = AcquisitionConfig::load_or_default(&config_path)?;
    config.validate()?;

    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Stop signal received");
                token.cancel();
            }
        });
    }

    let session = open_session(Some(cli.zenoh_config.as_str())).await?;
    let frames = AcquisitionBus::new(&config.arm.limb, &config.camera.name).frames;

    let mut camera = if cli.simulate {
        let mut camera =
            SimulatedCamera::new(&config.camera.name, frames.clone(), config.camera_parameters());
        camera.open();
        Some(camera)
    } else {
        let key = frames.name();
        forward_from_zenoh(&session, &key, frames.clone(), shutdown.clone()).await?;
        None
    };

    let options = VideoOptions {
        timestamp_log: config.camera.timestamp_log,
        jpeg_quality: config.camera.jpeg_quality,
    };
    let service = TriggerService::new(frames, options);
    let served = serve_trigger(&session, &config.trigger.service_name, service, shutdown).await?;
    info!("Camera service running, press Ctrl-C to stop");

    if let Err(e) = served.await {
        warn!("Trigger service task failed: {}", e);
    }
    if let Some(camera) = camera.as_mut() {
        camera.close().await;
    }
    Ok(())
}
