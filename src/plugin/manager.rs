use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::model::config::AppConfig;
use crate::plugin::backup::BackupManager;
use crate::plugin::database::VersionDatabase;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::host_fns::{ConsoleSink, ProgressSink, ReloadHook, ShellReload};
use crate::plugin::progress::{ProgressReporter, ProgressSettings};
use crate::plugin::registry::{HttpFetcher, RegistryClient};
use crate::plugin::store::LocalPluginStore;

/// Owned state every lifecycle operation works against: the plugin
/// directory, the version database, the backup area, the catalog client
/// and the host hooks.
///
/// Operations run one at a time; nothing here guards against a second
/// process mutating the same directory.
pub struct PluginManager {
    pub(crate) store: LocalPluginStore,
    pub(crate) database: VersionDatabase,
    pub(crate) backups: BackupManager,
    pub(crate) registry: RegistryClient,
    reload: Arc<dyn ReloadHook>,
    sink: Arc<dyn ProgressSink>,
    progress: ProgressSettings,
    pub(crate) update_pause: Duration,
}

impl PluginManager {
    pub fn new(
        store: LocalPluginStore,
        database: VersionDatabase,
        backups: BackupManager,
        registry: RegistryClient,
    ) -> Self {
        Self {
            store,
            database,
            backups,
            registry,
            reload: Arc::new(ShellReload::default()),
            sink: Arc::new(ConsoleSink::default()),
            progress: ProgressSettings::default(),
            update_pause: Duration::ZERO,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = LocalPluginStore::new(
            config.plugin_dir(),
            config.general.extension.clone(),
            config.general.private_prefix.clone(),
        );
        let database = VersionDatabase::open(config.database_path())
            .context("failed to open the plugin version database")?;
        let fetcher = HttpFetcher::new(
            &config.registry.user_agent,
            config.registry.retries,
            Duration::from_millis(config.registry.retry_backoff_ms),
        )?;
        let registry = RegistryClient::new(config.registry.catalog_url.clone(), Arc::new(fetcher));

        Ok(
            Self::new(store, database, BackupManager::new(config.backup_dir()), registry)
                .with_reload(Arc::new(ShellReload::new(config.reload.command.clone())))
                .with_progress(config.progress_settings())
                .with_update_pause(Duration::from_millis(config.registry.update_pause_ms)),
        )
    }

    pub fn with_reload(mut self, reload: Arc<dyn ReloadHook>) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSettings) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_update_pause(mut self, pause: Duration) -> Self {
        self.update_pause = pause;
        self
    }

    pub fn store(&self) -> &LocalPluginStore {
        &self.store
    }

    pub fn database(&self) -> &VersionDatabase {
        &self.database
    }

    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.sink.clone(), self.progress)
    }

    /// Copy an installed plugin file to `dest` (a file path or a directory).
    pub fn export(&self, name: &str, dest: &Path) -> PluginResult<PathBuf> {
        let source = self.store.path_for(name)?;
        if !source.is_file() {
            return Err(PluginError::NotFound(name.to_string()));
        }

        let target = if dest.is_dir() {
            dest.join(self.store.file_name(name))
        } else {
            dest.to_path_buf()
        };
        fs::copy(&source, &target).map_err(|err| PluginError::fs(&target, err))?;
        tracing::info!("exported {} to {}", source.display(), target.display());
        Ok(target)
    }

    /// Persist the database. A failed flush is logged and tolerated: the
    /// file already on disk then classifies as local-only until the next
    /// successful write.
    pub(crate) fn flush_database(&self) -> bool {
        match self.database.flush() {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("failed to write plugin records: {err}");
                false
            }
        }
    }

    /// Run the reload hook; `false` when it failed (already logged).
    pub(crate) async fn reload(&self) -> bool {
        match self.reload.reload().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("plugin reload failed: {err:#}");
                false
            }
        }
    }
}
