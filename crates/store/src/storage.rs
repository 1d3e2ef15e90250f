//! Snapshot persistence port and its two implementations.
//!
//! The whole session collection is written as one JSON document on every
//! mutation (read-modify-write of a single slot, last full write wins).

use anyhow::{Context, Result};
use shared::chat::ChatSession;
use std::fs;
use std::path::PathBuf;

/// Durable-storage seam for the session store. Implementations hold a
/// single snapshot; `save` replaces it wholesale.
pub trait SnapshotStorage: Send + Sync {
    /// Read the stored collection. An absent snapshot is an empty vec,
    /// not an error.
    fn load(&self) -> Result<Vec<ChatSession>>;

    /// Replace the stored collection with `sessions`.
    fn save(&self, sessions: &[ChatSession]) -> Result<()>;
}

/// File-backed snapshot: one pretty-printed JSON document under the
/// platform data directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new() -> Self {
        let base = directories::ProjectDirs::from("com.local", "NeyroPlan", "NeyroPlan")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("sessions.json"),
        }
    }

    /// Store the snapshot at an explicit path (tests, portable setups).
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStorage for FileStorage {
    fn load(&self) -> Result<Vec<ChatSession>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let sessions = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(sessions)
    }

    fn save(&self, sessions: &[ChatSession]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(sessions)?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory snapshot for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    slot: parking_lot::Mutex<Vec<ChatSession>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<ChatSession>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, sessions: &[ChatSession]) -> Result<()> {
        *self.slot.lock() = sessions.to_vec();
        Ok(())
    }
}
