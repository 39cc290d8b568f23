use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::host_fns::Attachment;
use crate::plugin::manager::PluginManager;
use crate::plugin::manifest::{Catalog, CatalogEntry, PluginRecord};
use crate::plugin::progress::{ProgressReporter, Tally};
use crate::plugin::report::{BatchReport, Failure, InstallOutcome};
use crate::plugin::store::validate_name;

impl PluginManager {
    /// Install one plugin from a freshly fetched catalog.
    pub async fn install_from_catalog(&mut self, name: &str) -> PluginResult<InstallOutcome> {
        let mut progress = self.reporter();
        progress.post(&format!("⬇️ installing plugin {name}...")).await;

        let result = match self.registry.fetch_catalog().await {
            Ok(catalog) => match catalog.get(name) {
                Some(entry) => self.install_entry(entry).await,
                None => Err(PluginError::NotFound(name.to_string())),
            },
            Err(err) => Err(err),
        };

        match &result {
            Ok(outcome) => {
                self.reload().await;
                progress.finish(&outcome.render()).await;
            }
            Err(err) => {
                tracing::warn!("install {name} failed: {err}");
                progress.finish(&format!("❌ failed to install {name}: {err}")).await;
            }
        }
        result
    }

    /// Install a user-supplied file. The plugin becomes local-only: an
    /// existing record is dropped so `update_all` leaves it alone. The
    /// overwritten file is still backed up.
    pub async fn install_from_attachment(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> PluginResult<InstallOutcome> {
        let mut progress = self.reporter();
        progress.post(&format!("⬇️ installing plugin {name}...")).await;

        let result = self.write_attachment(name, bytes);
        match &result {
            Ok(outcome) => {
                self.reload().await;
                progress.finish(&outcome.render()).await;
            }
            Err(err) => {
                tracing::warn!("install {name} from attachment failed: {err}");
                progress.finish(&format!("❌ failed to install {name}: {err}")).await;
            }
        }
        result
    }

    /// Derive the plugin name from the attachment's file name and install it.
    pub async fn install_attachment(&mut self, attachment: Attachment) -> PluginResult<InstallOutcome> {
        let suffix = format!(".{}", self.store.extension());
        let Some(name) = attachment.file_name.strip_suffix(&suffix) else {
            let err = PluginError::InvalidName(attachment.file_name.clone());
            self.reporter()
                .finish(&format!("❌ {err}: expected a `{suffix}` file"))
                .await;
            return Err(err);
        };

        let name = name.to_string();
        self.install_from_attachment(&name, &attachment.bytes).await
    }

    /// Install each name in order. Per-item failures are collected; only an
    /// unreachable catalog fails the whole call.
    pub async fn install_batch(&mut self, names: &[String]) -> PluginResult<BatchReport> {
        let mut progress = self.reporter();
        if names.is_empty() {
            progress.finish("❌ no plugin names given").await;
            return Ok(BatchReport::new(0));
        }

        let catalog = self.fetch_catalog_for_batch(&mut progress).await?;
        Ok(self.run_install_batch(&catalog, names, progress).await)
    }

    /// Install every plugin the catalog lists, in catalog order.
    pub async fn install_all(&mut self) -> PluginResult<BatchReport> {
        let mut progress = self.reporter();
        let catalog = self.fetch_catalog_for_batch(&mut progress).await?;

        if catalog.is_empty() {
            progress.finish("📦 the remote catalog is empty").await;
            return Ok(BatchReport::new(0));
        }

        let names = catalog.names();
        Ok(self.run_install_batch(&catalog, &names, progress).await)
    }

    async fn fetch_catalog_for_batch(
        &self,
        progress: &mut ProgressReporter,
    ) -> PluginResult<Catalog> {
        progress.post("🔍 fetching remote plugin catalog...").await;
        match self.registry.fetch_catalog().await {
            Ok(catalog) => Ok(catalog),
            Err(err) => {
                tracing::error!("cannot fetch plugin catalog: {err}");
                progress
                    .finish(&format!("❌ cannot fetch remote plugin catalog: {err}"))
                    .await;
                Err(err)
            }
        }
    }

    async fn run_install_batch(
        &mut self,
        catalog: &Catalog,
        names: &[String],
        mut progress: ProgressReporter,
    ) -> BatchReport {
        let total = names.len();
        let mut report = BatchReport::new(total);
        progress
            .post(&format!("📦 installing {total} plugins...\n\n🔄 0/{total} (0%)"))
            .await;

        for (index, name) in names.iter().enumerate() {
            let tally = Tally {
                succeeded: report.succeeded.len(),
                skipped: 0,
                failed: report.failed.len(),
            };
            progress.step("installing", name, index, total, tally).await;

            let result = match catalog.get(name) {
                Some(entry) => self.install_entry(entry).await,
                None => Err(PluginError::NotFound(name.clone())),
            };
            match result {
                Ok(_) => report.succeeded.push(name.clone()),
                Err(err) => {
                    tracing::warn!("install {name} failed: {err}");
                    report.failed.push(Failure::new(name.clone(), err));
                }
            }
        }

        report.reloaded = self.reload().await;

        let settings = *progress.settings();
        progress
            .finish(&report.render(settings.max_failures_shown, settings.bar_width))
            .await;
        report
    }

    /// download → backup → prune legacy marker → write → record → flush
    async fn install_entry(&mut self, entry: &CatalogEntry) -> PluginResult<InstallOutcome> {
        let name = entry.name.as_str();
        validate_name(name)?;
        if !entry.has_url() {
            return Err(PluginError::MissingUrl(name.to_string()));
        }

        let bytes = self.registry.download(name, &entry.url).await?;

        let backup = self.backups.backup_before_overwrite(&self.store, name)?;
        self.backups.prune_legacy_marker(&self.store, name)?;
        self.store.write(name, &bytes)?;

        self.database.upsert(name, PluginRecord::from_catalog(entry));
        if self.flush_database() {
            tracing::info!("recorded plugin {name} from {}", entry.url);
        }

        Ok(InstallOutcome {
            name: name.to_string(),
            backup,
            dropped_record: false,
        })
    }

    fn write_attachment(&mut self, name: &str, bytes: &[u8]) -> PluginResult<InstallOutcome> {
        validate_name(name)?;

        let dropped_record = self.database.remove(name).is_some();
        if dropped_record {
            self.flush_database();
            tracing::info!("dropped catalog record for {name}; it is now a local plugin");
        }

        let backup = self.backups.backup_before_overwrite(&self.store, name)?;
        self.store.write(name, bytes)?;

        Ok(InstallOutcome {
            name: name.to_string(),
            backup,
            dropped_record,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use crate::plugin::error::PluginError;
    use crate::plugin::host_fns::Attachment;
    use crate::plugin::manifest::PluginStatus;
    use crate::plugin::testing::{CountingReload, Fixture, plugin_url};

    #[tokio::test]
    async fn install_writes_fetched_bytes_and_records_catalog_entry() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "export const echo = 1;")]);
        let mut manager = fixture.manager();

        let outcome = manager.install_from_catalog("echo").await.unwrap();

        assert_eq!(outcome.backup, None);
        assert_eq!(manager.store().read("echo").unwrap(), b"export const echo = 1;");
        let record = manager.database().get("echo").unwrap();
        assert_eq!(record.url, plugin_url("echo"));
        assert_eq!(record.desc.as_deref(), Some("about echo"));
        assert_eq!(fixture.reload.calls(), 1);

        let reopened = fixture.manager();
        assert_eq!(reopened.database().get("echo").unwrap().url, plugin_url("echo"));
    }

    #[tokio::test]
    async fn unknown_name_has_no_side_effects() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "1")]);
        let mut manager = fixture.manager();

        let err = manager.install_from_catalog("ghost").await.unwrap_err();

        assert!(matches!(err, PluginError::NotFound(_)));
        assert!(manager.store().list().unwrap().is_empty());
        assert!(manager.database().is_empty());
        assert_eq!(fixture.reload.calls(), 0);
        assert!(fixture.sink.last().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn unreachable_catalog_aborts_single_install() {
        let fixture = Fixture::new();
        let mut manager = fixture.manager();

        let err = manager.install_from_catalog("echo").await.unwrap_err();
        assert!(matches!(err, PluginError::Network { .. }));
        assert!(manager.install_batch(&["echo".into()]).await.is_err());
        assert_eq!(fixture.fetcher.requests(&plugin_url("echo")), 0);
    }

    #[tokio::test]
    async fn failed_download_leaves_existing_file_untouched() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "v1")]);
        let mut manager = fixture.manager();
        manager.install_from_catalog("echo").await.unwrap();

        fixture.fetcher.take_down(&plugin_url("echo"));
        assert!(manager.install_from_catalog("echo").await.is_err());

        assert_eq!(manager.store().read("echo").unwrap(), b"v1");
        assert!(fixture.backups("echo").is_empty());
    }

    #[tokio::test]
    async fn reinstall_backs_up_and_prunes_legacy_marker() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "v1")]);
        let mut manager = fixture.manager();
        manager.install_from_catalog("echo").await.unwrap();

        let marker = manager.store().legacy_marker_path("echo").unwrap();
        fs::write(&marker, b"ancient").unwrap();
        fixture.publish(&[("echo", "v2")]);

        let outcome = manager.install_from_catalog("echo").await.unwrap();
        let backup = outcome.backup.unwrap();

        assert_eq!(fs::read(&backup).unwrap(), b"v1");
        assert_eq!(fixture.backups("echo"), vec![backup]);
        assert!(!marker.exists());
        assert_eq!(manager.store().read("echo").unwrap(), b"v2");
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let fixture = Fixture::new();
        fixture.publish(&[("a", "A"), ("b", "B"), ("c", "C")]);
        fixture.fetcher.take_down(&plugin_url("b"));
        let mut manager = fixture.manager();

        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let report = manager.install_batch(&names).await.unwrap();

        assert_eq!(report.succeeded, vec!["a", "c"]);
        assert_eq!(report.failed_names(), vec!["b"]);
        assert!(manager.store().contains("a") && manager.store().contains("c"));
        assert!(!manager.store().contains("b"));
        assert!(!manager.database().contains("b"));
        assert_eq!(fixture.reload.calls(), 1);

        let summary = fixture.sink.last().unwrap();
        assert!(summary.contains("installed: 2/3"));
        assert!(summary.contains("• b (network error"));
    }

    #[tokio::test]
    async fn batch_reports_catalog_misses_and_missing_urls() {
        let fixture = Fixture::new();
        fixture.publish_raw(serde_json::json!({
            "nourl": { "desc": "broken entry" },
        }));
        let mut manager = fixture.manager();

        let names = vec!["ghost".to_string(), "nourl".to_string()];
        let report = manager.install_batch(&names).await.unwrap();

        assert!(report.succeeded.is_empty());
        assert!(report.failed[0].error.is_not_found());
        assert!(matches!(report.failed[1].error, PluginError::MissingUrl(_)));
        let summary = fixture.sink.last().unwrap();
        assert!(summary.contains("not in catalog:\n• ghost"));
        assert!(summary.contains("nourl (no source URL)"));
    }

    #[tokio::test]
    async fn install_all_follows_catalog_order() {
        let fixture = Fixture::new();
        fixture.publish(&[("zeta", "z"), ("alpha", "a"), ("mid", "m")]);
        let mut manager = fixture.manager();

        let report = manager.install_all().await.unwrap();

        assert_eq!(report.succeeded, vec!["zeta", "alpha", "mid"]);
        assert_eq!(manager.database().names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(fixture.reload.calls(), 1);
    }

    #[tokio::test]
    async fn batch_progress_is_throttled_but_final_counts_are_exact() {
        let fixture = Fixture::new();
        let plugins: Vec<(String, String)> =
            (0..5).map(|i| (format!("p{i}"), format!("src {i}"))).collect();
        let borrowed: Vec<(&str, &str)> =
            plugins.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
        fixture.publish(&borrowed);
        let mut manager = fixture.manager();

        manager.install_all().await.unwrap();

        let steps: Vec<String> = fixture
            .sink
            .updates()
            .into_iter()
            .filter(|text| text.starts_with("📦 installing p"))
            .collect();
        assert_eq!(steps.len(), 3);
        assert!(steps[2].contains("5/5 (100%)"));
        assert!(fixture.sink.last().unwrap().contains("installed: 5/5"));
    }

    #[tokio::test]
    async fn attachment_install_turns_catalog_plugin_local_only() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "catalog build")]);
        let mut manager = fixture.manager();
        manager.install_from_catalog("echo").await.unwrap();

        let outcome = manager
            .install_attachment(Attachment {
                file_name: "echo.ts".into(),
                bytes: b"my fork".to_vec(),
            })
            .await
            .unwrap();

        assert!(outcome.dropped_record);
        assert_eq!(fs::read(outcome.backup.unwrap()).unwrap(), b"catalog build");
        assert_eq!(manager.store().read("echo").unwrap(), b"my fork");
        assert!(!manager.database().contains("echo"));
        assert!(!fixture.manager().database().contains("echo"));

        let catalog = manager.registry.fetch_catalog().await.unwrap();
        assert_eq!(
            manager.classify("echo", catalog.get("echo")),
            PluginStatus::LocalOnly
        );
        assert!(fixture.sink.last().unwrap().contains("keep receiving updates"));
        assert_eq!(fixture.reload.calls(), 2);
    }

    #[tokio::test]
    async fn fresh_attachment_needs_no_backup() {
        let fixture = Fixture::new();
        let mut manager = fixture.manager();

        let outcome = manager.install_from_attachment("solo", b"x").await.unwrap();
        assert_eq!(outcome.backup, None);
        assert!(!outcome.dropped_record);
        assert!(fixture.backups("solo").is_empty());
    }

    #[tokio::test]
    async fn attachment_with_foreign_extension_is_rejected() {
        let fixture = Fixture::new();
        let mut manager = fixture.manager();

        let err = manager
            .install_attachment(Attachment {
                file_name: "echo.py".into(),
                bytes: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));
        assert!(fixture.sink.last().unwrap().contains("expected a `.ts` file"));
        assert_eq!(fixture.reload.calls(), 0);
    }

    #[tokio::test]
    async fn batch_summary_admits_a_failed_reload() {
        let fixture = Fixture::new();
        fixture.publish(&[("a", "A")]);
        let reload = Arc::new(CountingReload::failing());
        let mut manager = fixture.manager().with_reload(reload.clone());

        let report = manager.install_all().await.unwrap();

        assert_eq!(report.succeeded, vec!["a"]);
        assert!(!report.reloaded);
        assert_eq!(reload.calls(), 1);
        let summary = fixture.sink.last().unwrap();
        assert!(summary.contains("plugin reload failed"));
        assert!(!summary.contains("plugins reloaded"));
    }

    #[tokio::test]
    async fn failed_record_flush_still_installs_as_local_only() {
        let fixture = Fixture::new();
        fixture.publish(&[("echo", "1")]);
        let mut manager = fixture.manager();
        let db_dir = fixture.database_path().parent().unwrap().to_path_buf();
        fs::write(&db_dir, b"").unwrap();

        let outcome = manager.install_from_catalog("echo").await.unwrap();

        assert_eq!(outcome.name, "echo");
        assert_eq!(manager.store().read("echo").unwrap(), b"1");
        assert!(!fixture.database_path().exists());

        fs::remove_file(&db_dir).unwrap();
        let reopened = fixture.manager();
        let catalog = reopened.registry.fetch_catalog().await.unwrap();
        assert_eq!(
            reopened.classify("echo", catalog.get("echo")),
            PluginStatus::LocalOnly
        );
    }
}
