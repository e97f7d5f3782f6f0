//! Credential storage for the Portal client runtime.
//!
//! This crate provides:
//! - [`ScopeStorage`], a small key/value backend trait
//! - [`MemoryStorage`] for the ephemeral (per-session) scope
//! - [`FileStorage`] for the persistent (survives restarts) scope
//! - [`CredentialStore`], the precedence-ordered facade over both scopes

mod file;
mod keys;
mod memory;
mod record;
mod store;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use record::{expiry_from, CredentialRecord, RetentionScope};
pub use store::CredentialStore;
pub use traits::ScopeStorage;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure (quota, disabled storage, ...)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default store: ephemeral scope in memory, persistent scope in
/// `credentials_file`.
pub fn create_credential_store(credentials_file: PathBuf) -> CredentialStore {
    CredentialStore::new(
        Box::new(MemoryStorage::new()),
        Box::new(FileStorage::new(credentials_file)),
    )
}
