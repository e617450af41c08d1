//! Log output.

use crate::error::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| Error::Config(format!("invalid log filter {default_filter:?}: {e}")))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Config(format!("logger already initialised: {e}")))
}
