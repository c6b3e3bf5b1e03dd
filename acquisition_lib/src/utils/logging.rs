//! Process-wide tracing setup shared by the acquisition nodes.
//!
//! Recorder workers run on tokio's blocking pool and worker threads, so the
//! subscriber is installed globally rather than per thread.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. "info") is
/// used. Calling this twice is harmless: the second call leaves the first
/// subscriber in place and returns `false`.
///
/// # Example
/// ```no_run
/// acquisition_lib::init_tracing("info");
/// ```
pub fn init_tracing(default_directive: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
