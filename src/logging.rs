use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Send `tracing` output to a log file; the terminal belongs to the UI.
///
/// `RUST_LOG` overrides the default `info` filter. Installing twice is a no-op.
pub fn init_file_logging(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file_and_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("readalong.log");
        init_file_logging(&path).unwrap();
        assert!(path.exists());
    }
}
