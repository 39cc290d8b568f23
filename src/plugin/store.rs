use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use ignore::WalkBuilder;
use regex::Regex;

use crate::plugin::error::{PluginError, PluginResult};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w[\w.-]*$").expect("valid plugin name regex"));

const BACKUP_MARKER: &str = "backup";

/// The managed plugin directory. One file per plugin, `<name>.<ext>`.
#[derive(Debug, Clone)]
pub struct LocalPluginStore {
    dir: PathBuf,
    extension: String,
    private_prefix: String,
}

impl LocalPluginStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        private_prefix: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            private_prefix: private_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.extension)
    }

    pub fn path_for(&self, name: &str) -> PluginResult<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(self.file_name(name)))
    }

    /// `<name>.<ext>.backup`, left behind by older installs.
    pub fn legacy_marker_path(&self, name: &str) -> PluginResult<PathBuf> {
        validate_name(name)?;
        Ok(self
            .dir
            .join(format!("{}.{BACKUP_MARKER}", self.file_name(name))))
    }

    /// Plugin name for a directory entry, or `None` for backups, type
    /// declarations and private files.
    pub fn manageable_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        if stem.is_empty()
            || file_name.contains(BACKUP_MARKER)
            || stem.ends_with(".d")
            || (!self.private_prefix.is_empty() && file_name.starts_with(&self.private_prefix))
        {
            return None;
        }
        Some(stem)
    }

    /// Sorted names of every manageable plugin file. Symlinks count when
    /// they resolve to a file.
    pub fn list(&self) -> PluginResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = WalkBuilder::new(&self.dir)
            .max_depth(Some(1))
            .standard_filters(false)
            .build()
            .flatten()
            .filter_map(|entry| {
                if entry.path() == self.dir || !entry.path().is_file() {
                    return None;
                }
                let file_name = entry.file_name().to_str()?;
                self.manageable_name(file_name).map(str::to_string)
            })
            .collect();

        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    pub fn read(&self, name: &str) -> PluginResult<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => PluginError::NotFound(name.to_string()),
            _ => PluginError::fs(&path, err),
        })
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> PluginResult<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|err| PluginError::fs(&self.dir, err))?;
        fs::write(&path, bytes).map_err(|err| PluginError::fs(&path, err))
    }

    pub fn delete(&self, name: &str) -> PluginResult<()> {
        let path = self.path_for(name)?;
        fs::remove_file(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => PluginError::NotFound(name.to_string()),
            _ => PluginError::fs(&path, err),
        })
    }

    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        let path = self.path_for(name).ok()?;
        fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }
}

/// Names become file names, so anything that could escape the plugin
/// directory is rejected.
pub fn validate_name(name: &str) -> PluginResult<()> {
    if name.trim().is_empty() {
        return Err(PluginError::EmptyName);
    }
    if name.contains("..") || !NAME_RE.is_match(name) {
        return Err(PluginError::InvalidName(name.to_string()));
    }
    Ok(())
}
