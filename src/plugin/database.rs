use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use indexmap::IndexMap;
use tempfile::NamedTempFile;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::PluginRecord;

/// Persisted `name -> PluginRecord` map, in insertion order.
///
/// Mutations only touch memory; callers decide when to `flush`.
#[derive(Debug)]
pub struct VersionDatabase {
    path: PathBuf,
    records: IndexMap<String, PluginRecord>,
}

impl VersionDatabase {
    /// Load the database document. A missing or empty file is an empty
    /// database.
    pub fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(PluginError::Database(format!("{}: {err}", path.display()))),
        };

        let records = if raw.iter().all(u8::is_ascii_whitespace) {
            IndexMap::new()
        } else {
            serde_json::from_slice(&raw)
                .map_err(|err| PluginError::Database(format!("{}: {err}", path.display())))?
        };

        Ok(Self { path, records })
    }

    pub fn get(&self, name: &str) -> Option<&PluginRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginRecord> {
        self.records.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Insert or replace; a replaced record keeps its position.
    pub fn upsert(&mut self, name: &str, record: PluginRecord) {
        self.records.insert(name.to_string(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<PluginRecord> {
        self.records.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginRecord)> {
        self.records
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }

    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the whole document through a temp file in the same directory,
    /// then rename over the old one.
    pub fn flush(&self) -> PluginResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.records)
            .map_err(|err| PluginError::Database(err.to_string()))?;

        self.write_atomic(&bytes)
            .map_err(|err| PluginError::Database(format!("{}: {err}", self.path.display())))?;

        tracing::debug!(
            "flushed {} plugin records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut file = NamedTempFile::new_in(&parent)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
