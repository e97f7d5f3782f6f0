//! Storage key constants.

/// Keys a credential record occupies inside one retention scope.
pub struct StorageKeys;

impl StorageKeys {
    /// Short-lived bearer token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Long-lived renewal token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Access token expiry (RFC 3339)
    pub const EXPIRES_AT: &'static str = "expires_at";

    /// Opaque user payload (JSON)
    pub const SUBJECT: &'static str = "subject";

    /// Every key belonging to a record, in write order.
    pub const ALL: [&'static str; 4] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::EXPIRES_AT,
        Self::SUBJECT,
    ];
}
