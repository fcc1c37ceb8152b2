//! Tracing setup for applications embedding the submission flow.
//!
//! Console output follows `RUST_LOG` (default `info`). The SSH library's own
//! handshake trace goes to a separate file at DEBUG, which is only meant for
//! debugging connection problems.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Target prefix of the SSH transport library's events.
const HANDSHAKE_TARGET: &str = "russh";

/// Install the global subscriber. Fails if one is already installed or the
/// log file cannot be opened.
pub fn init_tracing(handshake_log: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(handshake_log)?;

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let handshake_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(Targets::new().with_target(HANDSHAKE_TARGET, Level::DEBUG));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(handshake_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("turnin-ssh.log");
        assert!(init_tracing(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnin-ssh.log");
        // A subscriber may already be installed by another test; the file is
        // opened either way.
        let _ = init_tracing(&path);
        assert!(path.exists());
    }
}
