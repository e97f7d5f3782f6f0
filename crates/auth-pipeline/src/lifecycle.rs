//! Expiry arithmetic over credential records.
//!
//! Validity is the half-open interval `[issued, expires_at)`: a token is
//! expired at exactly `expires_at`. Proactive renewal only applies to tokens
//! that are still valid but close to expiry; dead tokens are left to the
//! reactive (401-triggered) path.

use chrono::{DateTime, Duration, Utc};
use credential_storage::CredentialRecord;

/// Default proactive renewal threshold.
pub const DEFAULT_RENEW_THRESHOLD: Duration = Duration::minutes(5);

/// True if there is no record or `now >= expires_at`.
pub fn is_expired(record: Option<&CredentialRecord>, now: DateTime<Utc>) -> bool {
    match record {
        Some(record) => now >= record.expires_at,
        None => true,
    }
}

/// True iff `0 < expires_at - now <= threshold`.
pub fn should_proactively_renew(
    record: &CredentialRecord,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    let remaining = record.expires_at - now;
    remaining > Duration::zero() && remaining <= threshold
}

/// `max(0, expires_at - now)`.
pub fn remaining_lifetime(record: &CredentialRecord, now: DateTime<Utc>) -> Duration {
    (record.expires_at - now).max(Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_expiring_at(expires_at: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            access_token: "A1".into(),
            refresh_token: "R1".into(),
            expires_at,
            subject: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_absent_record_is_expired() {
        assert!(is_expired(None, Utc::now()));
    }

    #[test]
    fn test_expiry_boundary_is_closed() {
        let now = Utc::now();
        let at_now = record_expiring_at(now);
        let past = record_expiring_at(now - Duration::seconds(1));
        let future = record_expiring_at(now + Duration::seconds(1));

        assert!(is_expired(Some(&at_now), now));
        assert!(is_expired(Some(&past), now));
        assert!(!is_expired(Some(&future), now));
    }

    #[test]
    fn test_proactive_threshold_boundaries() {
        let now = Utc::now();
        let threshold = DEFAULT_RENEW_THRESHOLD;

        let exactly_threshold = record_expiring_at(now + threshold);
        let just_inside = record_expiring_at(now + Duration::seconds(1));
        let just_outside = record_expiring_at(now + threshold + Duration::seconds(1));
        let at_expiry = record_expiring_at(now);
        let already_dead = record_expiring_at(now - Duration::seconds(30));

        assert!(should_proactively_renew(&exactly_threshold, now, threshold));
        assert!(should_proactively_renew(&just_inside, now, threshold));
        assert!(!should_proactively_renew(&just_outside, now, threshold));
        assert!(!should_proactively_renew(&at_expiry, now, threshold));
        assert!(!should_proactively_renew(&already_dead, now, threshold));
    }

    #[test]
    fn test_threshold_is_tunable() {
        let now = Utc::now();
        let record = record_expiring_at(now + Duration::seconds(90));

        assert!(!should_proactively_renew(&record, now, Duration::seconds(60)));
        assert!(should_proactively_renew(&record, now, Duration::seconds(120)));
    }

    #[test]
    fn test_remaining_lifetime_clamps_at_zero() {
        let now = Utc::now();
        assert_eq!(
            remaining_lifetime(&record_expiring_at(now + Duration::seconds(42)), now),
            Duration::seconds(42)
        );
        assert_eq!(
            remaining_lifetime(&record_expiring_at(now - Duration::seconds(42)), now),
            Duration::zero()
        );
    }
}
