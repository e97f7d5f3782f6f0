//! # Observability
//!
//! Centralized logging layer for the Portal workspace.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber; they only emit events.
//!
//! Output:
//! - Structured JSONL to a log file (one object per line) when `log_path` is set
//! - Compact human-readable lines on stderr when `also_stderr` is set
//!
//! The filter comes from `RUST_LOG` when present, otherwise from
//! `LogConfig::default_level`.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "portal-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::FileLogWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "portal-cli").
    /// Included in every JSON log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// JSONL log file. No file layer is installed when `None`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Installing a second global subscriber is a no-op, so calling this twice
/// (e.g. from tests) is harmless.
pub fn init_with_config(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let mut open_error = None;
    let json_layer = config.log_path.as_ref().and_then(|path| {
        match FileLogWriter::open(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), writer).with_filter(env_filter()),
            ),
            Err(err) => {
                open_error = Some((path.clone(), err));
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if let Some((path, err)) = open_error {
        tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "Failed to open log file, file logging disabled"
        );
    }

    if installed {
        tracing::debug!(service = %config.service_name, "observability initialized");
    }
}
