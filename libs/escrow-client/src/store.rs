//! Credential persistence.
//!
//! The private key and the server-assigned username are saved together
//! and only after registration has succeeded, so a crash mid-handshake
//! never leaves a key on disk the server has no record of.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// What survives across runs: the base64 private key and the username
/// the server minted for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub private_key: String,
    pub generated_username: String,
}

pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Option<StoredCredentials>;
    fn save(&self, credentials: &StoredCredentials) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<StoredCredentials>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<StoredCredentials> {
        self.slot.lock().clone()
    }

    fn save(&self, credentials: &StoredCredentials) -> io::Result<()> {
        *self.slot.lock() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// JSON file store used by the binary.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Option<StoredCredentials> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save(&self, credentials: &StoredCredentials) -> io::Result<()> {
        let raw = serde_json::to_string_pretty(credentials)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw)
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> StoredCredentials {
        StoredCredentials {
            private_key: "a2V5".into(),
            generated_username: "Quiet-Falcon-42".into(),
        }
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryIdentityStore::new();
        assert!(store.load().is_none());
        store.save(&credentials()).unwrap();
        assert_eq!(store.load(), Some(credentials()));
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("identity.json"));

        assert!(store.load().is_none());
        store.save(&credentials()).unwrap();
        assert_eq!(store.load(), Some(credentials()));

        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileIdentityStore::new(path).load().is_none());
    }
}
