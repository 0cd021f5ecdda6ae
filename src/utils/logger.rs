use crate::utils::error::{ForwardError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// Filtering honors `RUST_LOG` when set; otherwise only this crate logs, at
/// INFO and above. Fails if a subscriber is already installed, so embedding
/// applications that bring their own can simply not call this.
pub fn init() -> Result<()> {
    init_with_filter(concat!(env!("CARGO_CRATE_NAME"), "=info"))
}

/// Install the global subscriber with `directives` as the fallback filter
/// used when `RUST_LOG` is unset.
///
/// Relay-level payload descriptions only appear once this crate's DEBUG
/// level is enabled, e.g. `"ssh_forwarder=debug,russh=warn"`.
pub fn init_with_filter(directives: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| ForwardError::ConfigError(format!("failed to install subscriber: {}", e)))
}
