use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Every stored key, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryEntries {
    values: BTreeMap<String, String>,
    changed: BTreeSet<String>,
}

/// Shared in-process store. Clones see the same entries.
///
/// Keys written or removed since construction (or the last
/// [`MemoryStore::clear_changes`]) are tracked so a mirror only writes those.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<MemoryEntries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from already-persisted entries, none of them marked as changed.
    pub fn from_entries(values: BTreeMap<String, String>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(MemoryEntries {
                values,
                changed: BTreeSet::new(),
            })),
        }
    }

    /// Changed keys with their current value; `None` means removed.
    pub fn changes(&self) -> Result<BTreeMap<String, Option<String>>, StoreError> {
        let entries = self.lock()?;
        Ok(entries
            .changed
            .iter()
            .map(|key| (key.clone(), entries.values.get(key).cloned()))
            .collect())
    }

    pub fn clear_changes(&self) -> Result<(), StoreError> {
        self.lock()?.changed.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryEntries>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.values.insert(key.to_string(), value.to_string());
        entries.changed.insert(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        if entries.values.remove(key).is_some() {
            entries.changed.insert(key.to_string());
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.values.keys().cloned().collect())
    }
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        // Readers only ever see a complete file.
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            // Skips in-flight temp files, which start with a dot.
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("progress.v1", "{}").unwrap();
        assert_eq!(other.get("progress.v1").unwrap().as_deref(), Some("{}"));
        other.remove("progress.v1").unwrap();
        assert_eq!(store.get("progress.v1").unwrap(), None);
    }

    #[test]
    fn file_store_round_trips_and_treats_missing_keys_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));

        assert_eq!(store.get("curriculum.progress.v2").unwrap(), None);
        store.put("curriculum.progress.v2", "{\"a\":1}").unwrap();
        store.put("curriculum.progress.v2", "{\"a\":2}").unwrap();
        assert_eq!(
            store.get("curriculum.progress.v2").unwrap().as_deref(),
            Some("{\"a\":2}")
        );
        assert!(store.dir().join("curriculum.progress.v2.json").exists());

        store.remove("curriculum.progress.v2").unwrap();
        store.remove("curriculum.progress.v2").unwrap();
        assert_eq!(store.get("curriculum.progress.v2").unwrap(), None);
    }

    #[test]
    fn memory_store_tracks_changed_keys() {
        let mut persisted = BTreeMap::new();
        persisted.insert("progress.v1".to_string(), "{}".to_string());
        persisted.insert("curriculum.progress.v1".to_string(), "{}".to_string());
        let store = MemoryStore::from_entries(persisted);

        assert!(store.changes().unwrap().is_empty());
        assert_eq!(
            store.keys().unwrap(),
            vec!["curriculum.progress.v1".to_string(), "progress.v1".to_string()]
        );

        store.put("curriculum.progress.v2", "{\"a\":1}").unwrap();
        store.remove("curriculum.progress.v1").unwrap();
        store.remove("never.stored").unwrap();
        let changes = store.changes().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes["curriculum.progress.v2"].as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(changes["curriculum.progress.v1"], None);

        store.clear_changes().unwrap();
        assert!(store.changes().unwrap().is_empty());
        assert_eq!(store.get("curriculum.progress.v2").unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn file_store_lists_keys_without_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));
        assert!(store.keys().unwrap().is_empty());

        store.put("progress.v1", "{}").unwrap();
        store.put("curriculum.progress.v2", "{}").unwrap();
        fs::write(store.dir().join(".progress.v1.json.tmp"), "{").unwrap();
        fs::write(store.dir().join("notes.txt"), "hello").unwrap();

        assert_eq!(
            store.keys().unwrap(),
            vec!["curriculum.progress.v2".to_string(), "progress.v1".to_string()]
        );
    }
}
