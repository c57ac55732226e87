//! Log output setup
//!
//! The library only emits `tracing` events. Applications that want them
//! written somewhere call [`init_logging`] once at startup.

use std::fs::File;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{Error, Result};

/// Environment variable that selects the log level in [`init_from_env`]
pub const LOG_ENV_VAR: &str = "RBDB_LOG";

/// Install a global subscriber for this crate's events at `level`
///
/// Logs go to `config.log_file` when set (appended, no ANSI colours),
/// otherwise to stderr. A subscriber installed earlier is left in place.
pub fn init_logging(config: &Config, level: &str) -> Result<()> {
    let env_filter = EnvFilter::new(format!("rbdb_core={}", level));

    match config.log_file {
        Some(ref path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent.to_path_buf()))?;
            }
            let log_file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::from_io(e, path.clone()))?;

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }

    Ok(())
}

/// Install logging only when `RBDB_LOG` names a level
pub fn init_from_env(config: &Config) -> Result<bool> {
    let Ok(level) = std::env::var(LOG_ENV_VAR) else {
        return Ok(false);
    };
    init_logging(config, &level)?;
    Ok(true)
}
