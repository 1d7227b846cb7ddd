//! Tracing utilities for the host binary.

use anyhow::{anyhow, Result};
use tracing::Level;

/// Maps a `-v` count to the maximum log level: 0 is `ERROR`, 4 or more is `TRACE`.
pub(crate) const fn verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
pub fn init_tracing_subscriber(verbosity: u8) -> Result<()> {
    let subscriber =
        tracing_subscriber::fmt().with_max_level(verbosity_level(verbosity)).finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
