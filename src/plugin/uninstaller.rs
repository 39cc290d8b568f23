use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manager::PluginManager;
use crate::plugin::progress::Tally;
use crate::plugin::report::{Failure, UninstallAllReport, UninstallReport};

impl PluginManager {
    /// Remove one plugin file and its record.
    pub async fn uninstall_one(&mut self, name: &str) -> PluginResult<()> {
        let mut progress = self.reporter();
        progress.post(&format!("🗑 uninstalling plugin {name}...")).await;

        let result = self.remove_plugin(name);
        match &result {
            Ok(()) => {
                self.flush_database();
                self.reload().await;
                progress.finish(&format!("✅ plugin {name} uninstalled")).await;
            }
            Err(err) => {
                tracing::warn!("uninstall {name} failed: {err}");
                progress.finish(&format!("❌ cannot uninstall {name}: {err}")).await;
            }
        }
        result
    }

    /// Remove each name in order. The database is flushed once, after the
    /// loop.
    pub async fn uninstall_batch(&mut self, names: &[String]) -> UninstallReport {
        let mut progress = self.reporter();
        let total = names.len();
        let mut report = UninstallReport::default();
        progress
            .post(&format!("🗑 uninstalling {total} plugins..."))
            .await;

        for (index, raw) in names.iter().enumerate() {
            let name = raw.trim();
            let result = if name.is_empty() {
                Err(PluginError::EmptyName)
            } else {
                self.remove_plugin(name)
            };

            match result {
                Ok(()) => report.removed.push(name.to_string()),
                Err(err) => {
                    tracing::warn!("uninstall {raw:?} failed: {err}");
                    report.failed.push(Failure::new(raw.clone(), err));
                }
            }

            let tally = Tally {
                succeeded: report.removed.len(),
                skipped: 0,
                failed: report.failed.len(),
            };
            progress.step("uninstalled", name, index, total, tally).await;
        }

        self.flush_database();
        self.reload().await;
        progress.finish(&report.render()).await;
        report
    }

    /// Delete every manageable plugin file and clear the whole database.
    /// Backups, declarations and private files stay.
    pub async fn uninstall_all(&mut self) -> UninstallAllReport {
        let mut progress = self.reporter();
        progress
            .post("⚠️ clearing the plugin directory and records...")
            .await;

        let names = self.store.list().unwrap_or_else(|err| {
            tracing::error!("cannot scan plugin directory: {err}");
            Vec::new()
        });

        let mut report = UninstallAllReport::default();
        for name in names {
            match self.store.delete(&name) {
                Ok(()) => report.removed += 1,
                Err(err) => {
                    tracing::warn!("cannot remove plugin {name}: {err}");
                    report.failed.push(self.store.file_name(&name));
                }
            }
        }

        report.records_cleared = self.database.len();
        self.database.clear();
        self.flush_database();
        self.reload().await;

        progress.finish(&report.render()).await;
        report
    }

    fn remove_plugin(&mut self, name: &str) -> PluginResult<()> {
        self.store.delete(name)?;
        if self.database.remove(name).is_some() {
            tracing::info!("removed record for plugin {name}");
        }
        Ok(())
    }
}
