use std::{env, error::Error};

use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Sets up logging for a server binary.
/// Log filtering follows `RUST_LOG` and defaults to `info`. The service name
/// can be configured using the env var `SERVICE_NAME`, otherwise the cargo name
/// will be used.
///
/// This should generally be the first statement of any server binary's main
/// function. Fails if a global subscriber has already been installed.
pub fn setup() -> Result<(), Box<dyn Error>> {
    let service = env::var("SERVICE_NAME").unwrap_or(env!("CARGO_PKG_NAME").to_string());

    Registry::default()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!(%service, "starting server");
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
    })
}
