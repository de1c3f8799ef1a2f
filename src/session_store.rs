//! Key-value persistence for session progress.
//!
//! The saved blob is a small JSON document. Loading is forgiving: a missing
//! blob means a fresh start, and a corrupt one is reported so the caller can
//! discard it and start fresh as well.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::constants::SESSION_STORE_VERSION;
use crate::error::PersistenceError;
use crate::types::LevelResult;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u8,
    #[serde(rename = "completedTasks", alias = "completed_tasks", default)]
    pub completed_task_ids: Vec<String>,
    #[serde(default)]
    pub deaths: u32,
    #[serde(rename = "currentTaskId", alias = "current_task_id", default)]
    pub current_task_id: Option<String>,
    #[serde(rename = "collectiblesCollected", default)]
    pub collectibles_collected: u32,
    #[serde(rename = "levelResults", default)]
    pub level_results: Vec<LevelResult>,
    #[serde(rename = "savedAt", default)]
    pub saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Value>>,
}

impl PersistedSession {
    pub fn new(completed: &BTreeSet<String>, deaths: u32) -> Self {
        Self {
            version: SESSION_STORE_VERSION,
            completed_task_ids: completed.iter().cloned().collect(),
            deaths,
            current_task_id: None,
            collectibles_collected: 0,
            level_results: Vec::new(),
            saved_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            tasks: None,
        }
    }

    pub fn completed_set(&self) -> BTreeSet<String> {
        self.completed_task_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub fn encode_session(session: &PersistedSession) -> Result<String, PersistenceError> {
    serde_json::to_string_pretty(session).map_err(|error| PersistenceError::Corrupt(error.to_string()))
}

pub fn decode_session(text: &str) -> Result<PersistedSession, PersistenceError> {
    let parsed: PersistedSession =
        serde_json::from_str(text).map_err(|error| PersistenceError::Corrupt(error.to_string()))?;
    if parsed.version != SESSION_STORE_VERSION {
        return Err(PersistenceError::UnsupportedVersion(parsed.version));
    }
    Ok(parsed)
}

pub trait SessionStore: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError>;
    fn save(&mut self, session: &PersistedSession) -> Result<(), PersistenceError>;
    fn clear(&mut self) -> Result<(), PersistenceError>;
}

/// Stores the blob as a JSON file, replacing it atomically on save.
pub struct FileSessionStore {
    file_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        let text = match fs::read_to_string(&self.file_path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let session = decode_session(&text)?;
        debug!(path = %self.file_path.display(), "session loaded");
        Ok(Some(session))
    }

    fn save(&mut self, session: &PersistedSession) -> Result<(), PersistenceError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = encode_session(session)?;
        let temp_path = self.file_path.with_extension("json.tmp");
        fs::write(&temp_path, text)?;
        fs::rename(&temp_path, &self.file_path)?;
        debug!(path = %self.file_path.display(), "session saved");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// In-process store holding the encoded blob. Clones share the same slot,
/// so a test can keep a handle while the session owns another.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.blob.lock().ok().and_then(|slot| slot.clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, PersistenceError> {
        match self.raw() {
            Some(text) => decode_session(&text).map(Some),
            None => Ok(None),
        }
    }

    fn save(&mut self, session: &PersistedSession) -> Result<(), PersistenceError> {
        let text = encode_session(session)?;
        let mut slot = self
            .blob
            .lock()
            .map_err(|_| PersistenceError::Corrupt("memory store lock poisoned".to_string()))?;
        *slot = Some(text);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        let mut slot = self
            .blob
            .lock()
            .map_err(|_| PersistenceError::Corrupt("memory store lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        );
        std::env::temp_dir().join(unique).join("session.json")
    }

    fn sample() -> PersistedSession {
        let completed: BTreeSet<String> = ["lvl-3", "lvl-1", "lvl-2"]
            .iter()
            .map(|id| id.to_string())
            .collect();
        let mut session = PersistedSession::new(&completed, 4);
        session.current_task_id = Some("lvl-2".to_string());
        session.collectibles_collected = 6;
        session
    }

    #[test]
    fn file_store_round_trips_completed_set_and_deaths() {
        let path = temp_file("session-store-roundtrip");
        let mut store = FileSessionStore::new(path.clone());
        assert_eq!(store.load().expect("missing file is not an error"), None);

        let saved = sample();
        store.save(&saved).expect("save succeeds");
        let loaded = store.load().expect("load succeeds").expect("blob exists");
        assert_eq!(loaded.completed_set(), saved.completed_set());
        assert_eq!(loaded.deaths, 4);
        assert_eq!(loaded.current_task_id.as_deref(), Some("lvl-2"));
        assert_eq!(loaded, saved);

        store.clear().expect("clear succeeds");
        assert_eq!(store.load().expect("cleared"), None);
        store.clear().expect("clearing twice is fine");
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn corrupt_file_is_reported() {
        let path = temp_file("session-store-corrupt");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        fs::write(&path, "{ not json").expect("write file");

        let store = FileSessionStore::new(path.clone());
        assert!(matches!(store.load(), Err(PersistenceError::Corrupt(_))));

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let store = MemorySessionStore::with_blob(r#"{ "version": 9, "deaths": 1 }"#);
        assert!(matches!(
            store.load(),
            Err(PersistenceError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn partial_blob_falls_back_to_defaults() {
        let store = MemorySessionStore::with_blob(
            r#"{ "version": 1, "completedTasks": ["a", " ", "b", "a"] }"#,
        );
        let loaded = store.load().expect("parses").expect("present");
        assert_eq!(loaded.deaths, 0);
        assert_eq!(loaded.current_task_id, None);
        assert_eq!(
            loaded.completed_set().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn memory_store_clones_share_the_blob() {
        let handle = MemorySessionStore::new();
        let mut owned = handle.clone();
        owned.save(&sample()).expect("save");
        let raw = handle.raw().expect("blob written");
        assert!(raw.contains("\"completedTasks\""));
        assert!(raw.contains("\"lvl-1\""));
        owned.clear().expect("clear");
        assert!(handle.raw().is_none());
    }
}
