//! UI session lifecycle and the one-shot check flag
//!
//! A session is one live instance of the UI. Its `checked` flag marks whether
//! the permission check already ran. A session recreated from a
//! [`SavedSession`] (for example after a configuration change) keeps the flag;
//! a freshly created session starts unchecked.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::permission::PermissionId;

/// Identity of a live UI session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Permission check progress of one session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    NotChecked,
    Checking,
    /// Rationale shown; the request below is issued on acknowledgment
    AwaitingRationaleAck { to_request: Vec<PermissionId> },
    /// Host request in flight
    AwaitingOsResult { requested: Vec<PermissionId> },
    Checked,
}

impl CheckState {
    /// Whether a follow-up (ack or host result) is still outstanding
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::AwaitingRationaleAck { .. } | Self::AwaitingOsResult { .. }
        )
    }
}

/// Session-scoped state that survives recreation of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavedSession {
    pub checked: bool,
}

/// One live session
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    checked: bool,
    state: CheckState,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn state(&self) -> &CheckState {
        &self.state
    }

    /// Mark the one-shot check as started. Returns false if it already ran.
    pub(crate) fn begin_check(&mut self) -> bool {
        if self.checked {
            return false;
        }
        self.checked = true;
        self.state = CheckState::Checking;
        true
    }

    pub(crate) fn set_state(&mut self, state: CheckState) {
        self.state = state;
    }

    /// State to carry into a recreated session
    pub fn save(&self) -> SavedSession {
        SavedSession {
            checked: self.checked,
        }
    }
}

/// Registry of live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session; `saved` restores the flag of a recreated session
    pub fn open(&mut self, saved: Option<SavedSession>) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        let checked = saved.map(|s| s.checked).unwrap_or(false);
        let state = if checked {
            CheckState::Checked
        } else {
            CheckState::NotChecked
        };
        self.sessions.insert(id, Session { id, checked, state });
        id
    }

    /// Destroy a session, returning its saved state
    pub fn close(&mut self, id: SessionId) -> Option<SavedSession> {
        self.sessions.remove(&id).map(|s| s.save())
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether any session awaits an acknowledgment or a host result
    pub fn has_pending(&self) -> bool {
        self.sessions.values().any(|s| s.state.is_pending())
    }
}

// ============================================================================
// Saved session persistence
// ============================================================================

/// Error type for saved-session persistence
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access session state: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Storage for saved session state, keyed by application
pub trait SessionStateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<SavedSession>, StateError>;

    fn save(&self, key: &str, state: SavedSession) -> Result<(), StateError>;

    fn clear(&self, key: &str) -> Result<(), StateError>;
}

/// In-memory session state (lost when the process exits)
#[derive(Debug, Default)]
pub struct MemorySessionStateStore {
    data: RwLock<HashMap<String, SavedSession>>,
}

impl MemorySessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStateStore for MemorySessionStateStore {
    fn load(&self, key: &str) -> Result<Option<SavedSession>, StateError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).copied())
    }

    fn save(&self, key: &str, state: SavedSession) -> Result<(), StateError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), state);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StateError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFileData {
    version: u32,
    sessions: HashMap<String, SavedSession>,
}

/// JSON file holding saved session state.
/// Default: `<state_dir>/<app>/session.json`
pub struct FileSessionStateStore {
    path: PathBuf,
    data: RwLock<SessionFileData>,
}

impl FileSessionStateStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            SessionFileData {
                version: 1,
                sessions: HashMap::new(),
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn default_for_app(app_name: &str) -> Result<Self, StateError> {
        let dir = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from(".local"));
        Self::new(dir.join(app_name).join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &*data)?;
        Ok(())
    }
}

impl SessionStateStore for FileSessionStateStore {
    fn load(&self, key: &str) -> Result<Option<SavedSession>, StateError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.sessions.get(key).copied())
    }

    fn save(&self, key: &str, state: SavedSession) -> Result<(), StateError> {
        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            data.sessions.insert(key.to_string(), state);
        }
        self.persist()
    }

    fn clear(&self, key: &str) -> Result<(), StateError> {
        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            data.sessions.remove(key);
        }
        self.persist()
    }
}

impl fmt::Debug for FileSessionStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSessionStateStore")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_is_unchecked() {
        let mut registry = SessionRegistry::new();
        let id = registry.open(None);
        let session = registry.get(id).unwrap();
        assert!(!session.is_checked());
        assert_eq!(session.state(), &CheckState::NotChecked);
    }

    #[test]
    fn test_restored_session_keeps_flag() {
        let mut registry = SessionRegistry::new();
        let first = registry.open(None);
        assert!(registry.get_mut(first).unwrap().begin_check());

        let saved = registry.close(first).unwrap();
        assert!(saved.checked);

        let second = registry.open(Some(saved));
        assert_ne!(first, second);
        let session = registry.get_mut(second).unwrap();
        assert!(session.is_checked());
        assert!(!session.begin_check());
    }

    #[test]
    fn test_begin_check_runs_once() {
        let mut registry = SessionRegistry::new();
        let id = registry.open(None);
        let session = registry.get_mut(id).unwrap();

        assert!(session.begin_check());
        assert!(session.is_checked());
        assert_eq!(session.state(), &CheckState::Checking);
        assert!(!session.begin_check());
    }

    #[test]
    fn test_pending_tracking() {
        let mut registry = SessionRegistry::new();
        let id = registry.open(None);
        assert!(!registry.has_pending());

        registry
            .get_mut(id)
            .unwrap()
            .set_state(CheckState::AwaitingOsResult {
                requested: vec![PermissionId::new("mic")],
            });
        assert!(registry.has_pending());

        registry.close(id);
        assert!(registry.get(id).is_none());
        assert!(!registry.has_pending());
    }

    #[test]
    fn test_memory_state_store() {
        let store = MemorySessionStateStore::new();
        assert!(store.load("app").unwrap().is_none());

        store.save("app", SavedSession { checked: true }).unwrap();
        assert_eq!(store.load("app").unwrap(), Some(SavedSession { checked: true }));

        store.clear("app").unwrap();
        assert!(store.load("app").unwrap().is_none());
    }

    #[test]
    fn test_file_state_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileSessionStateStore::new(&path).unwrap();
        store.save("demo", SavedSession { checked: true }).unwrap();
        assert!(path.exists());

        let reopened = FileSessionStateStore::new(&path).unwrap();
        assert_eq!(
            reopened.load("demo").unwrap(),
            Some(SavedSession { checked: true })
        );

        reopened.clear("demo").unwrap();
        let again = FileSessionStateStore::new(&path).unwrap();
        assert!(again.load("demo").unwrap().is_none());
    }

    #[test]
    fn test_file_state_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileSessionStateStore::new(&path),
            Err(StateError::Parse(_))
        ));
    }
}
