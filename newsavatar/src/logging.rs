//! Logging bootstrap

use newsavatar_core::{NewsAvatarError, Result};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or `default_filter`
///
/// Calling it again is a no-op. Fails only if a different global
/// subscriber was installed elsewhere first.
pub fn init_logging(default_filter: &str) -> Result<()> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| NewsAvatarError::InvalidConfiguration {
            field: "log filter".to_string(),
            reason: e.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| NewsAvatarError::Initialization {
            reason: format!("failed to install log subscriber: {}", e),
        })?;

    let _ = INITIALIZED.set(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug").unwrap();
        init_logging("info").unwrap();
    }
}
