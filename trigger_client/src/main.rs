use acquisition_lib::comm::zenoh::{open_session, ZenohTrigger};
use acquisition_lib::{init_tracing, AcquisitionConfig, TriggerClient};
use eyre::Result;
use std::process::ExitCode;
use tracing::info;

const OUTNAME: &str = "test2";

fn usage(program: &str) -> String {
    format!("{} [bool]", program)
}

/// `start`, `true` and `1` (any case) request a start, anything else a stop.
fn parse_switch(arg: &str) -> bool {
    matches!(arg.to_lowercase().as_str(), "start" | "true" | "1")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing("warn");

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("trigger_client");
    let on = match args.as_slice() {
        [_, arg] => parse_switch(arg),
        _ => {
            eprintln!("{}", usage(program));
            return Ok(ExitCode::FAILURE);
        }
    };

    let config_path = AcquisitionConfig::resolve_path(None);
    let config = AcquisitionConfig::load_or_default(&config_path)?;
    config.validate()?;
    let zenoh_config =
        std::env::var("ZENOH_CONFIG").unwrap_or_else(|_| "config/zenoh.json5".to_string());
    let session = open_session(Some(zenoh_config.as_str())).await?;

    let transport = ZenohTrigger::new(
        session,
        &config.trigger.service_name,
        config.trigger.call_timeout(),
    );
    let client = TriggerClient::new(transport, config.trigger.wait_timeout());

    println!("Requesting {}.", if on { "start" } else { "stop" });
    let (success, message) = if on {
        client
            .request_start(
                OUTNAME,
                config.camera.fps,
                (config.camera.width, config.camera.height),
            )
            .await
    } else {
        client.request_stop().await
    };
    println!("({}, {:?})", success, message);
    info!("Trigger request finished");

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
