//! Durable session identity.
//!
//! The session id is created once, persisted under a fixed key, and reused
//! by every later run. When persistence is unavailable the store falls back
//! to an id that lives only as long as the process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use cartwise_core::error::{CartwiseError, Result};
use cartwise_core::types::Session;

const CREATED_AT_FIELD: &str = "created_at";

/// Where a session identifier is persisted.
pub trait SessionBackend: Send + Sync {
    /// Load the persisted session, if any.
    fn load(&self) -> Result<Option<Session>>;
    /// Persist `session`.
    fn store(&self, session: &Session) -> Result<()>;
}

// =============================================================================
// Backends
// =============================================================================

/// JSON file holding the session id under a fixed key.
///
/// Other keys in the file are preserved on write.
#[derive(Debug, Clone)]
pub struct FileSessionBackend {
    path: PathBuf,
    key: String,
}

impl FileSessionBackend {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(CartwiseError::Session(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl SessionBackend for FileSessionBackend {
    fn load(&self) -> Result<Option<Session>> {
        let Some(map) = self.read_map()? else {
            return Ok(None);
        };
        let Some(id) = map.get(&self.key).and_then(Value::as_str) else {
            return Ok(None);
        };
        if id.is_empty() {
            return Ok(None);
        }
        let created_at = map
            .get(CREATED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Ok(Some(Session {
            id: id.to_string(),
            created_at,
        }))
    }

    fn store(&self, session: &Session) -> Result<()> {
        let mut map = self.read_map().ok().flatten().unwrap_or_default();
        map.insert(self.key.clone(), Value::String(session.id.clone()));
        map.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(session.created_at.to_rfc3339()),
        );
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionBackend for MemorySessionBackend {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, session: &Session) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }
}

/// Backend whose storage is never available.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSessionBackend;

impl SessionBackend for UnavailableSessionBackend {
    fn load(&self) -> Result<Option<Session>> {
        Err(CartwiseError::Session("session storage unavailable".to_string()))
    }

    fn store(&self, _session: &Session) -> Result<()> {
        Err(CartwiseError::Session("session storage unavailable".to_string()))
    }
}

// =============================================================================
// Store
// =============================================================================

/// Owns the session identifier for the lifetime of the client.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    resolved: OnceLock<Session>,
    degraded: AtomicBool,
}

impl SessionStore {
    pub fn new(backend: impl SessionBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            resolved: OnceLock::new(),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemorySessionBackend::new())
    }

    /// Return the session, creating and persisting one on first use.
    ///
    /// Idempotent: every call in one process returns the same id.
    pub fn resolve(&self) -> Session {
        self.resolved.get_or_init(|| self.load_or_create()).clone()
    }

    /// Whether the current id is process-local because persistence failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn load_or_create(&self) -> Session {
        match self.backend.load() {
            Ok(Some(session)) => {
                tracing::debug!(session_id = %session.id, "Restored persisted session");
                return session;
            }
            Ok(None) => {}
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                let session = Session::generate();
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Session storage unreadable, using in-memory session"
                );
                return session;
            }
        }

        let session = Session::generate();
        match self.backend.store(&session) {
            Ok(()) => tracing::info!(session_id = %session.id, "Created new session"),
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Failed to persist session, using in-memory session"
                );
            }
        }
        session
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("resolved", &self.resolved.get().map(|s| s.id.as_str()))
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_idempotent() {
        let store = SessionStore::in_memory();
        let a = store.resolve();
        let b = store.resolve();
        assert_eq!(a.id, b.id);
        assert!(!store.is_degraded());
    }

    #[test]
    fn test_file_backend_persists_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let first = SessionStore::new(FileSessionBackend::new(&path, "session_id")).resolve();
        let second = SessionStore::new(FileSessionBackend::new(&path, "session_id")).resolve();
        assert_eq!(first.id, second.id);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["session_id"], Value::String(first.id.clone()));
    }

    #[test]
    fn test_file_backend_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let session = SessionStore::new(FileSessionBackend::new(&path, "session_id")).resolve();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["session_id"], Value::String(session.id));
    }

    #[test]
    fn test_file_backend_reads_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"session_id": "abc-123"}"#).unwrap();

        let store = SessionStore::new(FileSessionBackend::new(&path, "session_id"));
        assert_eq!(store.resolve().id, "abc-123");
    }

    #[test]
    fn test_unreadable_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let store = SessionStore::new(FileSessionBackend::new(&path, "session_id"));
        let a = store.resolve();
        assert!(store.is_degraded());
        assert_eq!(a.id, store.resolve().id);
    }

    #[test]
    fn test_unavailable_backend_falls_back() {
        let store = SessionStore::new(UnavailableSessionBackend);
        let a = store.resolve();
        let b = store.resolve();
        assert!(!a.id.is_empty());
        assert_eq!(a.id, b.id);
        assert!(store.is_degraded());
    }

    #[test]
    fn test_memory_backend_with_session() {
        let session = Session::generate();
        let store = SessionStore::new(MemorySessionBackend::with_session(session.clone()));
        assert_eq!(store.resolve(), session);
    }
}
