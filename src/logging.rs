//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup. Log lines go to stderr so that command
//! output on stdout stays pipeable.

use anyhow::{bail, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise `level` (`"error"`,
/// `"warn"`, `"info"`, `"debug"`, `"trace"`) applies.
pub fn init(level: &str) -> Result<()> {
    parse_level(level)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("invalid log level '{level}': {e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set subscriber: {e}"))?;

    Ok(())
}

/// Validate a level string.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    if level.is_empty() {
        bail!("log level must not be empty");
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| anyhow::anyhow!("unrecognised log level: '{level}'"))
}
