//! Persistent user preferences (currently only the chosen city).

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::config::Config;

/// Key the selected city is stored under.
pub const CITY_KEY: &str = "city";

/// String key/value store. Writes are last-writer-wins.
pub trait PreferenceStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Preferences kept as a flat TOML table on disk.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Config::project_dirs()?.data_dir().join("prefs.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read preferences: {}", self.path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse preferences: {}", self.path.display()))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create preferences directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string(&all).context("Failed to serialize preferences")?;
        fs::write(&self.path, toml)
            .with_context(|| format!("Failed to write preferences: {}", self.path.display()))?;

        tracing::debug!(key, "preference saved");
        Ok(())
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn with_city(city: &str) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(CITY_KEY.to_string(), city.to_string());
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs.toml"));
        assert_eq!(store.get(CITY_KEY).unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("prefs.toml");

        FilePreferenceStore::new(&path).set(CITY_KEY, "Seattle, Washington, United States").unwrap();

        let reopened = FilePreferenceStore::new(&path);
        assert_eq!(
            reopened.get(CITY_KEY).unwrap().as_deref(),
            Some("Seattle, Washington, United States")
        );
    }

    #[test]
    fn file_store_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs.toml"));
        store.set(CITY_KEY, "Columbus").unwrap();
        store.set("other", "x").unwrap();
        store.set(CITY_KEY, "Cincinnati").unwrap();

        assert_eq!(store.get(CITY_KEY).unwrap().as_deref(), Some("Cincinnati"));
        assert_eq!(store.get("other").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        fs::write(&path, "city = [").unwrap();

        let err = FilePreferenceStore::new(&path).get(CITY_KEY).unwrap_err();
        assert!(err.to_string().contains("Failed to parse preferences"));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryPreferenceStore::with_city("Seattle");
        assert_eq!(store.get(CITY_KEY).unwrap().as_deref(), Some("Seattle"));
        store.set(CITY_KEY, "Tacoma").unwrap();
        assert_eq!(store.get(CITY_KEY).unwrap().as_deref(), Some("Tacoma"));
    }
}
