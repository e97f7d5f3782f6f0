//! Configuration, paths, and logging setup shared by the Portal crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, IgnoredOverride, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_LOGOUT_TIMEOUT_SECS,
    DEFAULT_OAUTH_CALLBACK_PORT, DEFAULT_RENEW_THRESHOLD_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
