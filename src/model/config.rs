use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::progress::ProgressSettings;

const DEFAULTS: &str = include_str!("../../config/default.toml");

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub registry: RegistryConfig,
    pub progress: ProgressConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub plugin_dir: String,
    pub backup_dir: String,
    pub database_path: String,
    pub extension: String,
    pub private_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    pub catalog_url: String,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    pub update_pause_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ProgressConfig {
    pub max_failures_shown: usize,
    pub max_message_len: usize,
    pub bar_width: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadConfig {
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config. An explicit
    /// path must exist; otherwise the platform config file is used if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user = match explicit {
            Some(path) => Some(
                fs::read_to_string(path)
                    .with_context(|| format!("cannot read config {}", path.display()))?,
            ),
            None => match user_config_path() {
                Some(path) if path.exists() => Some(fs::read_to_string(&path)?),
                _ => None,
            },
        };

        let mut config = Self::from_layers(DEFAULTS, user.as_deref())?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Merge `user` over `defaults` table by table, so a user file only
    /// needs the keys it changes.
    pub fn from_layers(defaults: &str, user: Option<&str>) -> Result<Self> {
        let mut merged: toml::Value = toml::from_str(defaults)?;
        if let Some(user) = user {
            let overlay: toml::Value = toml::from_str(user).context("invalid user config")?;
            merge(&mut merged, overlay);
        }
        let config: Self = merged.try_into()?;
        Ok(config)
    }

    pub fn plugin_dir(&self) -> PathBuf {
        resolve(&self.general.plugin_dir, || data_dir().join("plugins"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        resolve(&self.general.backup_dir, || cache_dir().join("plugin_backups"))
    }

    pub fn database_path(&self) -> PathBuf {
        resolve(&self.general.database_path, || data_dir().join("plugins.json"))
    }

    pub fn progress_settings(&self) -> ProgressSettings {
        ProgressSettings {
            max_failures_shown: self.progress.max_failures_shown,
            max_message_len: self.progress.max_message_len,
            bar_width: self.progress.bar_width,
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        for path in [
            &mut self.general.plugin_dir,
            &mut self.general.backup_dir,
            &mut self.general.database_path,
        ] {
            if path.starts_with('~') {
                let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
                *path = path.replacen('~', &home.to_string_lossy(), 1);
            }
        }
        Ok(())
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".tpm"))
}

fn cache_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("tpm"))
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "tpm")
}

fn resolve(configured: &str, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    if configured.trim().is_empty() {
        fallback()
    } else {
        PathBuf::from(configured)
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
