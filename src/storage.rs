//! TTL-aware persisted credential storage.
//!
//! A [`StoredSession`] is the minimal identity a client needs to silently
//! rejoin its room after a process restart. The [`CredentialStore`] trait
//! isolates "serialize, write with absolute expiry, read with expiry check"
//! behind one seam so the medium (file, cookie jar, platform keychain) is
//! swappable.
//!
//! Persistence is best-effort by contract: the server remains the source of
//! truth on the next connect, so every storage failure is swallowed (with a
//! `tracing` warning) rather than surfaced to the caller. The only cost of a
//! broken store is that the session will not survive a restart.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{GameId, PlayerId};

/// How long a persisted session stays eligible for silent rejoin.
pub const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

// ── Stored record ───────────────────────────────────────────────────

/// The serialized subset of session identity that survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub game_id: GameId,
    pub player_id: PlayerId,
    #[serde(default)]
    pub session_key: String,
    /// Cosmetic player color; carried so preferences survive alongside identity.
    #[serde(default)]
    pub color: String,
}

/// On-disk envelope: the session plus its absolute expiry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    /// Unix seconds after which the record is treated as absent.
    expires_at: u64,
    #[serde(flatten)]
    session: StoredSession,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl StoredRecord {
    fn new(session: StoredSession, ttl: Duration) -> Self {
        Self {
            expires_at: now_unix().saturating_add(ttl.as_secs()),
            session,
        }
    }

    fn is_expired(&self) -> bool {
        now_unix() >= self.expires_at
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Durable key-value storage for one session record, with per-write expiry.
///
/// All methods are infallible at the interface: implementations absorb their
/// own I/O errors. `&self` receivers keep the trait object-safe and let the
/// reducer write through a shared reference on every identity mutation.
pub trait CredentialStore: Send + Sync {
    /// Serialize and store `session` with absolute expiry `now + ttl`,
    /// replacing any previous record.
    fn write(&self, session: &StoredSession, ttl: Duration);

    /// Return the stored session if present and not expired.
    ///
    /// Absent, corrupt, and expired records are all equivalent: `None`.
    fn read(&self) -> Option<StoredSession>;

    /// Remove the stored record, if any.
    fn clear(&self);
}

// ── In-memory store ─────────────────────────────────────────────────

/// A [`CredentialStore`] held entirely in memory.
///
/// Useful for tests and for embedders that manage persistence themselves.
/// Records still honor their expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn write(&self, session: &StoredSession, ttl: Duration) {
        if let Ok(mut slot) = self.record.lock() {
            *slot = Some(StoredRecord::new(session.clone(), ttl));
        }
    }

    fn read(&self) -> Option<StoredSession> {
        let slot = self.record.lock().ok()?;
        match slot.as_ref() {
            Some(record) if !record.is_expired() => Some(record.session.clone()),
            _ => None,
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.record.lock() {
            *slot = None;
        }
    }
}

// ── File-backed store ───────────────────────────────────────────────

/// A [`CredentialStore`] backed by a single JSON file.
///
/// Every I/O failure is logged and swallowed; a corrupt or unreadable file
/// reads as `None`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store that persists to `path`. The file is created on the
    /// first [`write`](CredentialStore::write).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the backing file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn write(&self, session: &StoredSession, ttl: Duration) {
        let record = StoredRecord::new(session.clone(), ttl);
        let json = match serde_json::to_vec(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize session record: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), "failed to persist session: {e}");
        }
    }

    fn read(&self) -> Option<StoredSession> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read session file: {e}");
                return None;
            }
        };
        let record: StoredRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), "corrupt session file, ignoring: {e}");
                return None;
            }
        };
        if record.is_expired() {
            debug!(path = %self.path.display(), "stored session expired");
            return None;
        }
        Some(record.session)
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to clear session file: {e}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn session() -> StoredSession {
        StoredSession {
            game_id: "MANGO".into(),
            player_id: "p1".into(),
            session_key: "key-1".into(),
            color: "teal".into(),
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.read().is_none());

        store.write(&session(), SESSION_TTL);
        assert_eq!(store.read(), Some(session()));
    }

    #[test]
    fn memory_store_expired_record_reads_as_absent() {
        let store = MemoryStore::new();
        store.write(&session(), Duration::ZERO);
        assert!(store.read().is_none());
    }

    #[test]
    fn memory_store_clear_removes_record() {
        let store = MemoryStore::new();
        store.write(&session(), SESSION_TTL);
        store.clear();
        assert!(store.read().is_none());
    }

    #[test]
    fn memory_store_overwrite_replaces_record() {
        let store = MemoryStore::new();
        store.write(&session(), SESSION_TTL);

        let mut other = session();
        other.player_id = "p2".into();
        store.write(&other, SESSION_TTL);

        assert_eq!(store.read().unwrap().player_id, "p2");
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        assert!(store.read().is_none());
        store.write(&session(), SESSION_TTL);
        assert_eq!(store.read(), Some(session()));
    }

    #[test]
    fn file_store_expired_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        store.write(&session(), Duration::ZERO);
        assert!(store.read().is_none());
        // The file still exists; only the read treats it as absent.
        assert!(store.path().exists());
    }

    #[test]
    fn file_store_corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"not json at all {{{").unwrap();

        let store = FileStore::new(&path);
        assert!(store.read().is_none());
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        store.write(&session(), SESSION_TTL);
        store.clear();
        assert!(store.read().is_none());
        // Clearing again must not fail.
        store.clear();
    }

    #[test]
    fn stored_record_expiry_math() {
        let record = StoredRecord::new(session(), Duration::from_secs(60));
        assert!(!record.is_expired());

        let expired = StoredRecord {
            expires_at: now_unix().saturating_sub(1),
            session: session(),
        };
        assert!(expired.is_expired());
    }

    #[test]
    fn stored_session_missing_optional_fields_deserializes() {
        let json = r#"{"game_id":"MANGO","player_id":"p1"}"#;
        let parsed: StoredSession = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.game_id, "MANGO");
        assert!(parsed.session_key.is_empty());
        assert!(parsed.color.is_empty());
    }
}
