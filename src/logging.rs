//! Log sink owned by the process entry point.
//!
//! Events go to an append-only log file through a `tracing-subscriber` fmt
//! layer. The subscriber is installed as the default for the calling thread
//! for as long as the returned `LogSink` lives; the server runtime is
//! current-thread, so every connection logs through it.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Installed log sink. Dropping it uninstalls the subscriber and closes the
/// file.
pub struct LogSink {
    _guard: DefaultGuard,
}

impl LogSink {
    /// Open `path` for appending and install a subscriber writing to it.
    ///
    /// Falls back to stderr if the file cannot be opened. `RUST_LOG`
    /// overrides `level`.
    pub fn open(level: &str, path: &Path) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false);

        let guard = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                tracing::subscriber::set_default(builder.with_writer(Mutex::new(file)).finish())
            }
            Err(e) => {
                eprintln!("Error - can't open log file '{}': {}", path.display(), e);
                tracing::subscriber::set_default(builder.with_writer(std::io::stderr).finish())
            }
        };

        Self { _guard: guard }
    }

    /// Record the final event and close the sink.
    pub fn close(self) {
        info!("Log closed");
    }
}
