//! JSON file store with read-modify-write mutations.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the bot knows about its user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Set via `/iam`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form observations, kept unique.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// The full memory record as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub user: UserProfile,
    /// Facts added via `/remember`, kept unique and in insertion order.
    #[serde(default)]
    pub facts: Vec<String>,
    /// Stamped on every save.
    pub last_updated: DateTime<Utc>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            user: UserProfile::default(),
            facts: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

/// File-backed memory store.
///
/// Each mutation is a full read-modify-write of the JSON file, serialized by
/// an internal lock. Writes go through a temp file and an atomic rename so a
/// crash mid-save never leaves a half-written record behind.
pub struct MemoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read the current record, falling back to an empty one when the file
    /// is missing or unreadable. A corrupt file is never an error: the bot
    /// keeps working and the next save replaces it.
    pub fn load(&self) -> Memory {
        match fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|err| {
                tracing::warn!(path = %self.path.display(), %err, "memory file is corrupt, starting fresh");
                Memory::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Memory::default(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "could not read memory file, starting fresh");
                Memory::default()
            }
        }
    }

    /// Persist a record, stamping `last_updated` with the current time.
    pub fn save(&self, memory: Memory) {
        let _guard = self.lock();
        self.persist(memory);
    }

    /// Record the user's name.
    pub fn set_user_name(&self, name: &str) {
        let _guard = self.lock();
        let mut memory = self.load();
        memory.user.name = Some(name.to_string());
        self.persist(memory);
    }

    /// Add a fact unless an identical one is already stored.
    pub fn add_fact(&self, fact: &str) {
        let _guard = self.lock();
        let mut memory = self.load();
        if !memory.facts.iter().any(|existing| existing == fact) {
            memory.facts.push(fact.to_string());
            self.persist(memory);
        }
    }

    /// Add a note about the user unless an identical one is already stored.
    pub fn add_user_note(&self, note: &str) {
        let _guard = self.lock();
        let mut memory = self.load();
        if !memory.user.notes.iter().any(|existing| existing == note) {
            memory.user.notes.push(note.to_string());
            self.persist(memory);
        }
    }

    /// Reset the record to its empty state.
    pub fn clear(&self) {
        let _guard = self.lock();
        self.persist(Memory::default());
    }

    /// Remove the fact at `index` (0-based). Returns false when the index is
    /// out of range, leaving the record untouched.
    pub fn forget_fact(&self, index: usize) -> bool {
        let _guard = self.lock();
        let mut memory = self.load();
        if index >= memory.facts.len() {
            return false;
        }
        memory.facts.remove(index);
        self.persist(memory);
        true
    }

    /// Render the record as prompt text, one sentence group per line.
    /// Returns an empty string when there is nothing to tell the model.
    pub fn build_context(&self) -> String {
        let memory = self.load();
        let mut parts = Vec::new();

        if let Some(name) = &memory.user.name {
            parts.push(format!("The user's name is {name}."));
        }
        if !memory.user.notes.is_empty() {
            parts.push(format!(
                "Notes about the user: {}",
                memory.user.notes.join(". ")
            ));
        }
        if !memory.facts.is_empty() {
            parts.push(format!("Things to remember: {}", memory.facts.join(". ")));
        }

        parts.join("\n")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // A poisoned lock only means another thread panicked mid-mutation;
        // the file itself is still safe to use.
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Saving is best-effort: a failed write is logged and the bot keeps
    /// running on the previous record.
    fn persist(&self, mut memory: Memory) {
        memory.last_updated = Utc::now();
        if let Err(err) = self.write_atomically(&memory) {
            tracing::error!(path = %self.path.display(), "could not save memory: {err:#}");
        }
    }

    fn write_atomically(&self, memory: &Memory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(memory).context("serializing memory")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}
