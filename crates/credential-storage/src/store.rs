//! Credential store over the two retention scopes.
//!
//! Lookups check the persistent scope first and fall back to the ephemeral
//! one, so a persistent record shadows an ephemeral one. Writes never touch
//! the other scope; `clear` always empties both.
//!
//! Backend failures never reach callers: a failed read is reported as an
//! absent record, a failed write is logged. A record that cannot be parsed is
//! purged from its scope and also reported as absent.

use crate::{
    CredentialRecord, MemoryStorage, RetentionScope, ScopeStorage, StorageKeys, StorageResult,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Result of reading one scope.
enum ScopeRead {
    Absent,
    Present(CredentialRecord),
    Malformed(String),
}

/// Facade holding the current credential record in one of two scopes.
pub struct CredentialStore {
    ephemeral: Box<dyn ScopeStorage>,
    persistent: Box<dyn ScopeStorage>,
    /// Serializes multi-key reads and writes so no reader sees a half-updated record.
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(ephemeral: Box<dyn ScopeStorage>, persistent: Box<dyn ScopeStorage>) -> Self {
        Self {
            ephemeral,
            persistent,
            lock: Mutex::new(()),
        }
    }

    /// Store with both scopes held in memory.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()), Box::new(MemoryStorage::new()))
    }

    fn backend(&self, scope: RetentionScope) -> &dyn ScopeStorage {
        match scope {
            RetentionScope::Ephemeral => self.ephemeral.as_ref(),
            RetentionScope::Persistent => self.persistent.as_ref(),
        }
    }

    /// Write the full record into the scope chosen by `persistent`.
    pub fn put(&self, record: &CredentialRecord, persistent: bool) {
        let scope = RetentionScope::from_remember_me(persistent);
        let _guard = self.lock.lock();

        if let Err(err) = self.write_record(scope, record) {
            warn!(scope = scope.as_str(), error = %err, "Failed to store credential record");
            // Never leave a partially written record behind.
            self.purge_scope(scope);
            return;
        }

        debug!(
            scope = scope.as_str(),
            expires_at = %record.expires_at.to_rfc3339(),
            "Stored credential record"
        );
    }

    fn write_record(&self, scope: RetentionScope, record: &CredentialRecord) -> StorageResult<()> {
        let backend = self.backend(scope);
        backend.set(StorageKeys::ACCESS_TOKEN, &record.access_token)?;
        backend.set(StorageKeys::REFRESH_TOKEN, &record.refresh_token)?;
        backend.set(StorageKeys::EXPIRES_AT, &record.expires_at.to_rfc3339())?;
        backend.set(StorageKeys::SUBJECT, &record.subject.to_string())?;
        Ok(())
    }

    /// Current record: persistent scope first, else ephemeral, else `None`.
    pub fn get(&self) -> Option<CredentialRecord> {
        let _guard = self.lock.lock();
        self.locate().map(|(_, record)| record)
    }

    /// Scope currently holding the authoritative record.
    pub fn scope(&self) -> Option<RetentionScope> {
        let _guard = self.lock.lock();
        self.locate().map(|(scope, _)| scope)
    }

    /// Current record together with the scope holding it, read atomically.
    pub fn get_with_scope(&self) -> Option<(RetentionScope, CredentialRecord)> {
        let _guard = self.lock.lock();
        self.locate()
    }

    fn locate(&self) -> Option<(RetentionScope, CredentialRecord)> {
        [RetentionScope::Persistent, RetentionScope::Ephemeral]
            .into_iter()
            .find_map(|scope| match self.read_scope(scope) {
                ScopeRead::Present(record) => Some((scope, record)),
                ScopeRead::Absent => None,
                ScopeRead::Malformed(reason) => {
                    warn!(scope = scope.as_str(), reason = %reason, "Discarding malformed credential record");
                    self.purge_scope(scope);
                    None
                }
            })
    }

    fn read_scope(&self, scope: RetentionScope) -> ScopeRead {
        let backend = self.backend(scope);
        let read = |key: &str| -> Result<Option<String>, ()> {
            backend.get(key).map_err(|err| {
                warn!(scope = scope.as_str(), key, error = %err, "Credential storage read failed");
            })
        };

        let (access, refresh, expires, subject) = match (
            read(StorageKeys::ACCESS_TOKEN),
            read(StorageKeys::REFRESH_TOKEN),
            read(StorageKeys::EXPIRES_AT),
            read(StorageKeys::SUBJECT),
        ) {
            (Ok(a), Ok(r), Ok(e), Ok(s)) => (a, r, e, s),
            _ => return ScopeRead::Absent,
        };

        if access.is_none() && refresh.is_none() && expires.is_none() && subject.is_none() {
            return ScopeRead::Absent;
        }

        let (Some(access_token), Some(refresh_token), Some(expires_raw)) = (access, refresh, expires)
        else {
            return ScopeRead::Malformed("incomplete record".to_string());
        };

        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return ScopeRead::Malformed("empty token".to_string());
        }

        let expires_at = match DateTime::parse_from_rfc3339(&expires_raw) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => return ScopeRead::Malformed(format!("invalid expiry: {}", err)),
        };

        let subject = match subject {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => return ScopeRead::Malformed(format!("invalid subject: {}", err)),
            },
            None => serde_json::Value::Null,
        };

        ScopeRead::Present(CredentialRecord {
            access_token,
            refresh_token,
            expires_at,
            subject,
        })
    }

    /// Replace the access token and its expiry in whichever scope holds the
    /// record, provided that record still carries `refresh_token`.
    ///
    /// Returns false without writing when the record is gone or has been
    /// replaced by a different session.
    pub fn update_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> bool {
        let _guard = self.lock.lock();

        let Some(scope) = self.holding_scope(refresh_token) else {
            return false;
        };

        let backend = self.backend(scope);
        let result = backend
            .set(StorageKeys::ACCESS_TOKEN, access_token)
            .and_then(|_| backend.set(StorageKeys::EXPIRES_AT, &expires_at.to_rfc3339()));

        match result {
            Ok(()) => debug!(
                scope = scope.as_str(),
                expires_at = %expires_at.to_rfc3339(),
                "Updated access token"
            ),
            Err(err) => {
                warn!(scope = scope.as_str(), error = %err, "Failed to update access token");
            }
        }
        true
    }

    /// Remove the record from both scopes if it still carries `refresh_token`.
    pub fn clear_if_current(&self, refresh_token: &str) -> bool {
        let _guard = self.lock.lock();

        if self.holding_scope(refresh_token).is_none() {
            return false;
        }

        self.purge_scope(RetentionScope::Persistent);
        self.purge_scope(RetentionScope::Ephemeral);
        debug!("Cleared credential records from both scopes");
        true
    }

    /// Scope of the current record if its refresh token matches. Caller holds the lock.
    fn holding_scope(&self, refresh_token: &str) -> Option<RetentionScope> {
        match self.locate() {
            Some((scope, record)) if record.refresh_token == refresh_token => Some(scope),
            Some(_) => {
                debug!("Credential record was replaced, leaving it alone");
                None
            }
            None => {
                debug!("No credential record to update");
                None
            }
        }
    }

    /// Remove the record from both scopes.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        self.purge_scope(RetentionScope::Persistent);
        self.purge_scope(RetentionScope::Ephemeral);
        debug!("Cleared credential records from both scopes");
    }

    fn purge_scope(&self, scope: RetentionScope) {
        let backend = self.backend(scope);
        for key in StorageKeys::ALL {
            if let Err(err) = backend.delete(key) {
                warn!(scope = scope.as_str(), key, error = %err, "Failed to delete credential key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use chrono::Duration;
    use std::sync::Arc;

    /// Backend that fails every call.
    struct BrokenStorage;

    impl ScopeStorage for BrokenStorage {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Backend("quota exceeded".to_string()))
        }

        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Backend("storage disabled".to_string()))
        }

        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::Backend("storage disabled".to_string()))
        }
    }

    /// Shares one MemoryStorage so tests can inspect a scope directly.
    struct SharedStorage(Arc<MemoryStorage>);

    impl ScopeStorage for SharedStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.0.set(key, value)
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.0.get(key)
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key)
        }
    }

    fn observed_store() -> (CredentialStore, Arc<MemoryStorage>, Arc<MemoryStorage>) {
        let ephemeral = Arc::new(MemoryStorage::new());
        let persistent = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(
            Box::new(SharedStorage(ephemeral.clone())),
            Box::new(SharedStorage(persistent.clone())),
        );
        (store, ephemeral, persistent)
    }

    fn record(access: &str, refresh: &str) -> CredentialRecord {
        CredentialRecord::issued(
            access,
            refresh,
            3600,
            serde_json::json!({ "id": "user-1", "email": "a@example.com" }),
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_store_returns_none() {
        let store = CredentialStore::in_memory();
        assert!(store.get().is_none());
        assert!(store.scope().is_none());
    }

    #[test]
    fn test_put_and_get_roundtrip_in_ephemeral_scope() {
        let (store, ephemeral, persistent) = observed_store();
        let rec = record("A1", "R1");

        store.put(&rec, false);

        assert_eq!(store.get(), Some(rec));
        assert_eq!(store.scope(), Some(RetentionScope::Ephemeral));
        assert!(ephemeral.has(StorageKeys::ACCESS_TOKEN).unwrap());
        assert!(!persistent.has(StorageKeys::ACCESS_TOKEN).unwrap());
    }

    #[test]
    fn test_persistent_record_shadows_ephemeral() {
        let (store, ephemeral, _persistent) = observed_store();
        store.put(&record("OLD", "R-old"), false);
        store.put(&record("NEW", "R-new"), true);

        let current = store.get().unwrap();
        assert_eq!(current.access_token, "NEW");
        assert_eq!(store.scope(), Some(RetentionScope::Persistent));

        // Writing one scope leaves the other untouched.
        assert_eq!(
            ephemeral.get(StorageKeys::ACCESS_TOKEN).unwrap(),
            Some("OLD".to_string())
        );
    }

    #[test]
    fn test_clear_removes_both_scopes() {
        let (store, ephemeral, persistent) = observed_store();
        store.put(&record("E", "RE"), false);
        store.put(&record("P", "RP"), true);

        store.clear();

        assert!(store.get().is_none());
        for key in StorageKeys::ALL {
            assert!(!ephemeral.has(key).unwrap());
            assert!(!persistent.has(key).unwrap());
        }
    }

    #[test]
    fn test_update_access_token_targets_holding_scope() {
        let (store, ephemeral, persistent) = observed_store();
        store.put(&record("A1", "R1"), true);
        let new_expiry = Utc::now() + Duration::seconds(900);

        assert!(store.update_access_token("R1", "A2", new_expiry));

        let current = store.get().unwrap();
        assert_eq!(current.access_token, "A2");
        assert_eq!(current.refresh_token, "R1");
        assert_eq!(current.expires_at, new_expiry);
        assert_eq!(
            persistent.get(StorageKeys::ACCESS_TOKEN).unwrap(),
            Some("A2".to_string())
        );
        assert!(!ephemeral.has(StorageKeys::ACCESS_TOKEN).unwrap());
    }

    #[test]
    fn test_update_without_record_is_noop() {
        let (store, ephemeral, persistent) = observed_store();
        assert!(!store.update_access_token("R1", "A2", Utc::now()));
        assert!(store.get().is_none());
        assert!(!ephemeral.has(StorageKeys::ACCESS_TOKEN).unwrap());
        assert!(!persistent.has(StorageKeys::ACCESS_TOKEN).unwrap());
    }

    #[test]
    fn test_update_for_replaced_session_is_noop() {
        let (store, _ephemeral, _persistent) = observed_store();
        let replacement = record("A-new", "R-new");
        store.put(&replacement, false);

        assert!(!store.update_access_token("R-old", "A-stale", Utc::now()));
        assert_eq!(store.get(), Some(replacement));
    }

    #[test]
    fn test_clear_if_current_matches_refresh_token() {
        let (store, ephemeral, persistent) = observed_store();
        store.put(&record("E", "RE"), false);
        store.put(&record("P", "RP"), true);

        // The shadowed ephemeral token does not identify the current record
        assert!(!store.clear_if_current("RE"));
        assert_eq!(store.get().unwrap().refresh_token, "RP");

        assert!(store.clear_if_current("RP"));
        assert!(store.get().is_none());
        assert!(!ephemeral.has(StorageKeys::REFRESH_TOKEN).unwrap());
        assert!(!persistent.has(StorageKeys::REFRESH_TOKEN).unwrap());

        assert!(!store.clear_if_current("RP"));
    }

    #[test]
    fn test_malformed_expiry_is_purged_and_falls_back() {
        let (store, _ephemeral, persistent) = observed_store();
        store.put(&record("E1", "RE1"), false);
        store.put(&record("P1", "RP1"), true);
        persistent.set(StorageKeys::EXPIRES_AT, "yesterday-ish").unwrap();

        let current = store.get().unwrap();
        assert_eq!(current.access_token, "E1");
        assert!(!persistent.has(StorageKeys::ACCESS_TOKEN).unwrap());
    }

    #[test]
    fn test_incomplete_record_is_absent() {
        let (store, ephemeral, _persistent) = observed_store();
        ephemeral.set(StorageKeys::ACCESS_TOKEN, "A1").unwrap();

        assert!(store.get().is_none());
        assert!(!ephemeral.has(StorageKeys::ACCESS_TOKEN).unwrap());
    }

    #[test]
    fn test_unparseable_subject_is_absent() {
        let (store, ephemeral, _persistent) = observed_store();
        store.put(&record("A1", "R1"), false);
        ephemeral.set(StorageKeys::SUBJECT, "{broken").unwrap();

        assert!(store.get().is_none());
    }

    #[test]
    fn test_missing_subject_defaults_to_null() {
        let (store, ephemeral, _persistent) = observed_store();
        store.put(&record("A1", "R1"), false);
        ephemeral.delete(StorageKeys::SUBJECT).unwrap();

        assert_eq!(store.get().unwrap().subject, serde_json::Value::Null);
    }

    #[test]
    fn test_broken_backend_reads_as_absent() {
        let store = CredentialStore::new(Box::new(BrokenStorage), Box::new(BrokenStorage));
        store.put(&record("A1", "R1"), true);
        store.update_access_token("R1", "A2", Utc::now());
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_broken_persistent_backend_falls_back_to_ephemeral() {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()), Box::new(BrokenStorage));
        store.put(&record("A1", "R1"), false);

        assert_eq!(store.get().unwrap().access_token, "A1");
        assert_eq!(store.scope(), Some(RetentionScope::Ephemeral));
    }
}
