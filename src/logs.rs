use std::env::var;

use anyhow::{Result, anyhow};
use tracing::info;

/// Install a subscriber from `RUST_LOG` if it is set.
///
/// Returns whether logging was configured.
pub fn from_env() -> Result<bool> {
    if var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow!("{e}"))?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Install a subscriber whose level follows the `-v` count. Zero leaves
/// logging off.
pub fn from_verbosity(verbosity: u8) {
    let filter = match verbosity {
        0 => return,
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };

    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        Ok(_) => info!("logging initialised"),
        Err(e) => eprintln!("Failed to initialise logging, continuing with none\n{e}"),
    }
}
