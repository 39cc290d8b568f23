//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::plugin::backup::BackupManager;
use crate::plugin::database::VersionDatabase;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::host_fns::{ProgressSink, ReloadHook};
use crate::plugin::manager::PluginManager;
use crate::plugin::registry::{Fetcher, RegistryClient};
use crate::plugin::store::LocalPluginStore;

/// Serves canned bodies by URL; unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn take_down(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn requests(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.as_str() == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get(&self, url: &str) -> PluginResult<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PluginError::network(url, "404 Not Found"))
    }
}

/// Records every update; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::Relaxed);
        sink
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.updates.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn update(&self, text: &str) -> Result<()> {
        self.updates.lock().unwrap().push(text.to_string());
        if self.failing.load(Ordering::Relaxed) {
            bail!("message can no longer be edited");
        }
        Ok(())
    }
}

/// Counts reloads; can be switched to fail.
#[derive(Debug, Default)]
pub struct CountingReload {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingReload {
    pub fn failing() -> Self {
        let reload = Self::default();
        reload.failing.store(true, Ordering::Relaxed);
        reload
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReloadHook for CountingReload {
    async fn reload(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            bail!("host refused to reload");
        }
        Ok(())
    }
}

pub const CATALOG_URL: &str = "https://registry.test/plugins.json";

pub fn plugin_url(name: &str) -> String {
    format!("https://registry.test/plugins/{name}.ts")
}

/// A manager wired to a temp directory and in-memory collaborators.
pub struct Fixture {
    pub tmp: TempDir,
    pub fetcher: Arc<FakeFetcher>,
    pub sink: Arc<RecordingSink>,
    pub reload: Arc<CountingReload>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
            fetcher: Arc::new(FakeFetcher::default()),
            sink: Arc::new(RecordingSink::default()),
            reload: Arc::new(CountingReload::default()),
        }
    }

    pub fn store(&self) -> LocalPluginStore {
        LocalPluginStore::new(self.tmp.path().join("plugins"), "ts", "_")
    }

    pub fn database_path(&self) -> PathBuf {
        self.tmp.path().join("tpm/plugins.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.tmp.path().join("plugin_backups")
    }

    /// A fresh manager over the same directories, as a new process would
    /// open it.
    pub fn manager(&self) -> PluginManager {
        PluginManager::new(
            self.store(),
            VersionDatabase::open(self.database_path()).unwrap(),
            BackupManager::new(self.backup_dir()),
            RegistryClient::new(CATALOG_URL, self.fetcher.clone()),
        )
        .with_sink(self.sink.clone())
        .with_reload(self.reload.clone())
    }

    /// Publish a catalog of `(name, source)` pairs, serving each source at
    /// `plugin_url(name)`.
    pub fn publish(&self, plugins: &[(&str, &str)]) {
        let mut catalog = serde_json::Map::new();
        for (name, source) in plugins {
            catalog.insert(
                name.to_string(),
                serde_json::json!({ "url": plugin_url(name), "desc": format!("about {name}") }),
            );
            self.fetcher.serve(&plugin_url(name), source.as_bytes());
        }
        self.fetcher
            .serve(CATALOG_URL, serde_json::Value::Object(catalog).to_string());
    }

    pub fn publish_raw(&self, catalog: serde_json::Value) {
        self.fetcher.serve(CATALOG_URL, catalog.to_string());
    }

    pub fn backups(&self, name: &str) -> Vec<PathBuf> {
        BackupManager::new(self.backup_dir()).backups_for(name)
    }
}
