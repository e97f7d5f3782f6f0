//! The persisted credential record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which storage lifetime holds a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionScope {
    /// Lives only as long as the current session/process.
    Ephemeral,
    /// Survives restarts.
    Persistent,
}

impl RetentionScope {
    /// Scope selected by a "remember me" flag.
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self::Persistent
        } else {
            Self::Ephemeral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Persistent => "persistent",
        }
    }
}

/// Access/refresh token pair plus the access token's absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    /// User payload returned at login. Passed through unvalidated.
    #[serde(default)]
    pub subject: serde_json::Value,
}

impl CredentialRecord {
    /// Build a record for a freshly issued token: `expires_at = now + expires_in`.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
        subject: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: expiry_from(now, expires_in_secs),
            subject,
        }
    }
}

/// `now + expires_in_secs`, saturating instead of overflowing on absurd values.
pub fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in_secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(if expires_in_secs < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_computes_absolute_expiry() {
        let now = Utc::now();
        let record = CredentialRecord::issued("A1", "R1", 3600, serde_json::Value::Null, now);
        assert_eq!(record.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc::now();
        assert_eq!(expiry_from(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry_from(now, i64::MIN), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_scope_from_remember_me() {
        assert_eq!(RetentionScope::from_remember_me(true), RetentionScope::Persistent);
        assert_eq!(RetentionScope::from_remember_me(false), RetentionScope::Ephemeral);
    }
}
