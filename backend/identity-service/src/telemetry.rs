//! Structured logging setup.

use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "identity_service=info,info";

/// Install the global JSON subscriber for `service`. `RUST_LOG` overrides the
/// default filter. Calling it again once a subscriber is installed is a no-op.
pub fn init_tracing(service: &str) -> anyhow::Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    info!(service, "Tracing initialized");
    Ok(())
}
