//! Persistent capture-enable state.
//!
//! A single small JSON file `{"enabled": bool, "last_update": ISO8601}`
//! survives restarts so a camera disabled from the web interface or the
//! message bus stays disabled after a reboot. Rewritten on every change;
//! written to a temp file and renamed so a crash mid-write cannot leave a
//! truncated file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub enabled: bool,
    pub last_update: String,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            enabled: true,
            last_update: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Load/save access to the state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted state. A missing file means a fresh install and
    /// yields the default (capture enabled); an unreadable file is logged
    /// and treated the same so a corrupt state file cannot brick startup.
    pub fn load(&self) -> PersistedState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    log_warning!(
                        "State file {} is corrupt ({e}), using defaults",
                        self.path.display()
                    );
                    PersistedState::default()
                }
            },
            Err(_) => PersistedState::default(),
        }
    }

    /// Persist a new enabled value with the current timestamp.
    pub fn save(&self, enabled: bool) -> Result<()> {
        let state = PersistedState {
            enabled,
            last_update: chrono::Local::now().to_rfc3339(),
        };
        let raw = serde_json::to_string_pretty(&state)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().enabled);
    }

    #[test]
    fn round_trips_enabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        store.save(false).unwrap();
        assert!(!store.load().enabled);

        store.save(true).unwrap();
        assert!(store.load().enabled);
    }

    #[test]
    fn corrupt_file_defaults_to_enabled() {
        crate::logger::Log::set_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = StateStore::new(path);
        assert!(store.load().enabled);
        crate::logger::Log::set_enabled(true);
    }

    #[test]
    fn save_records_a_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(true).unwrap();

        let state = store.load();
        assert!(chrono::DateTime::parse_from_rfc3339(&state.last_update).is_ok());
    }
}
