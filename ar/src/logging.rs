//! Tracing subscriber setup for embedding hosts

use eyre::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Map a level name onto a tracing level, defaulting to INFO
pub fn parse_level(level: Option<&str>) -> tracing::Level {
    let Some(s) = level else {
        debug!("parse_level: level is None, defaulting to INFO");
        return tracing::Level::INFO;
    };
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            debug!(level = %s, "parse_level: unknown level, defaulting to INFO");
            tracing::Level::INFO
        }
    }
}

/// Install a stderr subscriber filtered by `level` and `RUST_LOG`
///
/// Fails only when `RUST_LOG` holds an unparseable filter. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn setup_logging(level: Option<&str>) -> Result<()> {
    let level = parse_level(level);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .context("Invalid RUST_LOG filter")?;

    let installed = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("Logging initialized (level: {:?})", level);
    } else {
        debug!("setup_logging: subscriber already installed");
    }
    Ok(())
}
