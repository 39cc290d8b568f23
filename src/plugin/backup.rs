use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::store::LocalPluginStore;

/// ISO 8601 with `:` and `.` replaced so the stamp is a valid file name
/// and still sorts chronologically.
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// What follows `<name>_` in a backup file name.
static STAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-\d{3}Z(\.[^.]+)?$")
        .expect("valid backup stamp regex")
});

/// Copies plugin files aside before they are overwritten.
#[derive(Debug)]
pub struct BackupManager {
    dir: PathBuf,
    last_issued: HashMap<String, DateTime<Utc>>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_issued: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy the current revision of `name` into the backup area. No-op when
    /// there is nothing on disk to overwrite.
    pub fn backup_before_overwrite(
        &mut self,
        store: &LocalPluginStore,
        name: &str,
    ) -> PluginResult<Option<PathBuf>> {
        let source = store.path_for(name)?;
        if !source.is_file() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|err| PluginError::fs(&self.dir, err))?;

        let target = self.next_backup_path(name, store.extension());
        fs::copy(&source, &target).map_err(|err| PluginError::fs(&target, err))?;
        tracing::info!("backed up {} to {}", source.display(), target.display());

        Ok(Some(target))
    }

    /// Remove a stale `<name>.<ext>.backup` sibling if one exists.
    pub fn prune_legacy_marker(&self, store: &LocalPluginStore, name: &str) -> PluginResult<bool> {
        let marker = store.legacy_marker_path(name)?;
        if !marker.is_file() {
            return Ok(false);
        }

        fs::remove_file(&marker).map_err(|err| PluginError::fs(&marker, err))?;
        tracing::info!("removed legacy backup {}", marker.display());
        Ok(true)
    }

    /// Backups of `name`, oldest first.
    pub fn backups_for(&self, name: &str) -> Vec<PathBuf> {
        let prefix = format!("{name}_");
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|file| file.to_str())
                    .and_then(|file| file.strip_prefix(&prefix))
                    .is_some_and(|rest| STAMP_RE.is_match(rest))
            })
            .collect();

        paths.sort();
        paths
    }

    fn next_backup_path(&mut self, name: &str, extension: &str) -> PathBuf {
        let mut stamp = Utc::now();
        if let Some(last) = self.last_issued.get(name) {
            if stamp <= *last {
                stamp = *last + TimeDelta::milliseconds(1);
            }
        }

        loop {
            let path = self.dir.join(format!(
                "{name}_{}.{extension}",
                stamp.format(STAMP_FORMAT)
            ));
            if !path.exists() {
                self.last_issued.insert(name.to_string(), stamp);
                return path;
            }
            stamp += TimeDelta::milliseconds(1);
        }
    }
}
