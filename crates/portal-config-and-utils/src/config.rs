//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API base URL (can be overridden at compile time via PORTAL_API_URL env var).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("PORTAL_API_URL") {
    Some(url) => url,
    None => "http://localhost:3000/api",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Remaining lifetime at or below which an access token is renewed before use.
pub const DEFAULT_RENEW_THRESHOLD_SECS: u64 = 5 * 60;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the best-effort logout call.
pub const DEFAULT_LOGOUT_TIMEOUT_SECS: u64 = 5;

/// Default localhost port for the OAuth callback listener.
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 9876;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the backend; auth endpoints live under `{base}/auth/...`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Proactive renewal threshold in seconds.
    #[serde(default = "default_renew_threshold_secs")]
    pub renew_threshold_secs: u64,
    /// Timeout applied to every outbound request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for the logout call; local teardown proceeds regardless.
    #[serde(default = "default_logout_timeout_secs")]
    pub logout_timeout_secs: u64,
    /// Port the OAuth callback listener binds on localhost.
    #[serde(default = "default_oauth_callback_port")]
    pub oauth_callback_port: u16,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_renew_threshold_secs() -> u64 {
    DEFAULT_RENEW_THRESHOLD_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_logout_timeout_secs() -> u64 {
    DEFAULT_LOGOUT_TIMEOUT_SECS
}

fn default_oauth_callback_port() -> u16 {
    DEFAULT_OAUTH_CALLBACK_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            renew_threshold_secs: DEFAULT_RENEW_THRESHOLD_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            logout_timeout_secs: DEFAULT_LOGOUT_TIMEOUT_SECS,
            oauth_callback_port: DEFAULT_OAUTH_CALLBACK_PORT,
        }
    }
}

/// An environment override that could not be parsed and was skipped.
///
/// Returned rather than logged because configuration is loaded before the
/// subscriber that would record the warning exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub variable: &'static str,
    pub value: String,
}

impl Config {
    /// Load configuration from the config file (if any), then apply
    /// environment overrides. Overrides that failed to parse are returned
    /// alongside the config.
    pub fn load(paths: &Paths) -> CoreResult<(Self, Vec<IgnoredOverride>)> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        let ignored = config.apply_overrides(|name| std::env::var(name).ok());
        Ok((config, ignored))
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `PORTAL_*` overrides from the given lookup. Unparseable numeric
    /// values leave the setting untouched and are reported back.
    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<IgnoredOverride> {
        let lookup = |name: &str| lookup(name).and_then(non_empty);
        let mut ignored = Vec::new();

        if let Some(level) = lookup("PORTAL_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("PORTAL_API_URL") {
            self.api_base_url = url;
        }

        let numeric = [
            ("PORTAL_RENEW_THRESHOLD_SECS", &mut self.renew_threshold_secs),
            ("PORTAL_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs),
        ];
        for (variable, setting) in numeric {
            let Some(raw) = lookup(variable) else {
                continue;
            };
            match raw.parse() {
                Ok(secs) => *setting = secs,
                Err(_) => ignored.push(IgnoredOverride {
                    variable,
                    value: raw,
                }),
            }
        }

        ignored
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Proactive renewal threshold.
    pub fn renew_threshold(&self) -> chrono::Duration {
        i64::try_from(self.renew_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn logout_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.logout_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.renew_threshold(), chrono::Duration::minutes(5));
        assert_eq!(config.logout_timeout(), std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "renew_threshold_secs": 60 }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.renew_threshold_secs, 60);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.oauth_callback_port, DEFAULT_OAUTH_CALLBACK_PORT);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.api_base_url = "https://portal.example.com/api".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.api_base_url, "https://portal.example.com/api");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let (config, _ignored) = Config::load(&paths).unwrap();
        assert_eq!(config.logout_timeout_secs, DEFAULT_LOGOUT_TIMEOUT_SECS);
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORTAL_API_URL", "https://staging.example.com/api"),
            ("PORTAL_RENEW_THRESHOLD_SECS", "not-a-number"),
            ("PORTAL_REQUEST_TIMEOUT_SECS", "12"),
            ("PORTAL_LOG_LEVEL", "   "),
        ]);

        let mut config = Config::default();
        let ignored = config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_base_url, "https://staging.example.com/api");
        assert_eq!(config.renew_threshold_secs, DEFAULT_RENEW_THRESHOLD_SECS);
        assert_eq!(config.request_timeout_secs, 12);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(
            ignored,
            vec![IgnoredOverride {
                variable: "PORTAL_RENEW_THRESHOLD_SECS",
                value: "not-a-number".to_string(),
            }]
        );
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.api_base_url = "not a valid url".to_string();
        assert!(config.api_base_url().is_err());
    }
}
