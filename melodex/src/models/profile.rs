//! Profile persistence (C9) — a named (database_path, enabled_file_types,
//! fuzzy_config) triple, exactly one of which is active per process.
//!
//! Profile switch is atomic from the store's perspective: quiesce pending
//! writes, close connections, reopen against the new database path, rebuild
//! caches lazily. The pool-swap half of that lives in
//! `workflow::duplicate_scan::ScanCoordinator::switch_profile`; this module
//! owns only the on-disk profile bundle and never queries the catalog
//! directly.

use chrono::{DateTime, Utc};
use melodex_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::FuzzyConfig;

/// Default enabled file-type extensions for a newly created profile.
pub fn default_file_types() -> Vec<String> {
    ["mp3", "flac", "ogg", "m4a", "wav", "aac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub database_path: PathBuf,
    pub enabled_file_types: Vec<String>,
    pub fuzzy_config: FuzzyConfig,
    pub created_date: DateTime<Utc>,
    pub last_used_date: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, database_path: PathBuf) -> Self {
        let now = melodex_common::time::now_truncated();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            database_path,
            enabled_file_types: default_file_types(),
            fuzzy_config: FuzzyConfig::default(),
            created_date: now,
            last_used_date: now,
        }
    }

    /// Deep copy with a fresh id/name, used by the profile "duplicate" endpoint.
    pub fn duplicate_as(&self, new_id: impl Into<String>, new_name: impl Into<String>) -> Self {
        let now = melodex_common::time::now_truncated();
        Self {
            id: new_id.into(),
            name: new_name.into(),
            created_date: now,
            last_used_date: now,
            ..self.clone()
        }
    }
}

/// On-disk representation of all known profiles, plus which one is active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfilesFile {
    active_id: Option<String>,
    #[serde(default)]
    profiles: HashMap<String, Profile>,
}

/// Loads/saves the profiles file and tracks the single active profile.
/// Exactly one profile is active at a time; switching is atomic from the
/// store's perspective.
pub struct ProfileStore {
    path: PathBuf,
    file: ProfilesFile,
}

impl ProfileStore {
    /// Load `path` if it exists, otherwise start from an empty store with a
    /// single `default` profile pointing at `default_db_path`.
    pub fn load_or_init(path: PathBuf, default_db_path: PathBuf) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let file: ProfilesFile =
                toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
            Ok(Self { path, file })
        } else {
            let mut store = Self {
                path,
                file: ProfilesFile::default(),
            };
            let default_profile = Profile::new("default", "Default", default_db_path);
            store.file.active_id = Some(default_profile.id.clone());
            store
                .file
                .profiles
                .insert(default_profile.id.clone(), default_profile);
            store.save()?;
            Ok(store)
        }
    }

    pub fn save(&self) -> Result<()> {
        melodex_common::paths::ensure_parent_dir(&self.path)?;
        let text = toml::to_string_pretty(&self.file).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn active(&self) -> Result<&Profile> {
        let id = self
            .file
            .active_id
            .as_ref()
            .ok_or_else(|| Error::NotFound("no active profile".into()))?;
        self.file
            .profiles
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("active profile '{id}' missing")))
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.file.profiles.get(id)
    }

    pub fn list(&self) -> Vec<&Profile> {
        let mut v: Vec<&Profile> = self.file.profiles.values().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }

    pub fn create(&mut self, profile: Profile) -> Result<()> {
        if self.file.profiles.contains_key(&profile.id) {
            return Err(Error::Conflict(format!(
                "profile '{}' already exists",
                profile.id
            )));
        }
        self.file.profiles.insert(profile.id.clone(), profile);
        self.save()
    }

    /// Replace an existing profile's fields by id. Used by the config
    /// endpoints that edit a single field (fuzzy config, file types,
    /// description) without going through `create`/`delete`.
    pub fn update(&mut self, profile: Profile) -> Result<()> {
        if !self.file.profiles.contains_key(&profile.id) {
            return Err(Error::NotFound(format!("profile '{}' not found", profile.id)));
        }
        self.file.profiles.insert(profile.id.clone(), profile);
        self.save()
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.file.active_id.as_deref() == Some(id) {
            return Err(Error::InvalidArgument("cannot delete the active profile".into()));
        }
        self.file
            .profiles
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("profile '{id}' not found")))?;
        self.save()
    }

    /// Atomically mark `id` as active. Caller is responsible for the
    /// connection-pool swap (see `ScanCoordinator::switch_profile`).
    pub fn activate(&mut self, id: &str) -> Result<&Profile> {
        if !self.file.profiles.contains_key(id) {
            return Err(Error::NotFound(format!("profile '{id}' not found")));
        }
        self.file.active_id = Some(id.to_string());
        if let Some(p) = self.file.profiles.get_mut(id) {
            p.last_used_date = melodex_common::time::now_truncated();
        }
        self.save()?;
        self.file.profiles.get(id).ok_or_else(|| {
            Error::Internal("profile disappeared immediately after activation".into())
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_default_profile_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let profiles_path = dir.path().join("profiles.toml");
        let db_path = dir.path().join("library.db");

        let store = ProfileStore::load_or_init(profiles_path.clone(), db_path.clone()).unwrap();
        assert!(profiles_path.exists());
        assert_eq!(store.active().unwrap().id, "default");
        assert_eq!(store.active().unwrap().database_path, db_path);
    }

    #[test]
    fn create_and_activate_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_init(
            dir.path().join("profiles.toml"),
            dir.path().join("library.db"),
        )
        .unwrap();

        let second = Profile::new("work", "Work Library", dir.path().join("work.db"));
        store.create(second).unwrap();
        assert_eq!(store.list().len(), 2);

        store.activate("work").unwrap();
        assert_eq!(store.active().unwrap().id, "work");
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_init(
            dir.path().join("profiles.toml"),
            dir.path().join("library.db"),
        )
        .unwrap();
        let dup = Profile::new("default", "Another", dir.path().join("other.db"));
        assert!(matches!(store.create(dup), Err(Error::Conflict(_))));
    }

    #[test]
    fn update_replaces_an_existing_profile_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_init(
            dir.path().join("profiles.toml"),
            dir.path().join("library.db"),
        )
        .unwrap();
        let mut updated = store.get("default").unwrap().clone();
        updated.description = "edited".into();
        store.update(updated).unwrap();
        assert_eq!(store.get("default").unwrap().description, "edited");
    }

    #[test]
    fn update_rejects_unknown_profile_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_init(
            dir.path().join("profiles.toml"),
            dir.path().join("library.db"),
        )
        .unwrap();
        let ghost = Profile::new("ghost", "Ghost", dir.path().join("ghost.db"));
        assert!(matches!(store.update(ghost), Err(Error::NotFound(_))));
    }

    #[test]
    fn cannot_delete_active_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProfileStore::load_or_init(
            dir.path().join("profiles.toml"),
            dir.path().join("library.db"),
        )
        .unwrap();
        assert!(store.delete("default").is_err());
    }

    #[test]
    fn reloads_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let profiles_path = dir.path().join("profiles.toml");
        {
            let mut store = ProfileStore::load_or_init(
                profiles_path.clone(),
                dir.path().join("library.db"),
            )
            .unwrap();
            let second = Profile::new("work", "Work", dir.path().join("work.db"));
            store.create(second).unwrap();
            store.activate("work").unwrap();
        }
        let reloaded =
            ProfileStore::load_or_init(profiles_path, dir.path().join("library.db")).unwrap();
        assert_eq!(reloaded.active().unwrap().id, "work");
        assert_eq!(reloaded.list().len(), 2);
    }
}
