use std::env;

use ec_provider::config::EnvDefaults;
use ec_provider::server::ServeError;
use ec_provider::{serve_with_options, try_init_logging, EcProvider, LogFormat, LogOptions, ServeOptions};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), ServeError> {
    let format = env::var("EC_PROVIDER_LOG_FORMAT")
        .ok()
        .map(|raw| raw.parse::<LogFormat>())
        .transpose()?
        .unwrap_or_default();
    try_init_logging(&LogOptions {
        format,
        ..Default::default()
    });

    let mut options = ServeOptions::new();
    if let Ok(raw) = env::var("EC_PROVIDER_SHUTDOWN_TIMEOUT") {
        match humantime::parse_duration(&raw) {
            Ok(timeout) => options = options.with_shutdown_timeout(timeout),
            Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid EC_PROVIDER_SHUTDOWN_TIMEOUT"),
        }
    }

    serve_with_options(EcProvider::new(EnvDefaults::from_env()), options).await
}
