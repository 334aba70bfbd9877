use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter for binaries: our own crate at info, sqlx only when it complains.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,actix_web=info";

/// Installs the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Calling it twice is an error, so tests never call it.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}
