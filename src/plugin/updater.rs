use crate::plugin::error::PluginResult;
use crate::plugin::manager::PluginManager;
use crate::plugin::progress::Tally;
use crate::plugin::report::{Failure, SkipReason, UpdateReport};

enum UpdateStep {
    Updated,
    Skipped(SkipReason),
}

impl PluginManager {
    /// Re-download every recorded plugin and rewrite the ones whose source
    /// changed. Identical content is skipped without a backup, so a second
    /// run against an unchanged catalog updates nothing.
    pub async fn update_all(&mut self) -> UpdateReport {
        let mut progress = self.reporter();
        let names = self.database.names();
        let total = names.len();
        let mut report = UpdateReport {
            total,
            ..UpdateReport::default()
        };

        if total == 0 {
            progress.finish(&report.render(0)).await;
            return report;
        }

        progress
            .post(&format!("📦 updating {total} plugins...\n\n🔄 0/{total} (0%)"))
            .await;

        for (index, name) in names.iter().enumerate() {
            let tally = Tally {
                succeeded: report.updated.len(),
                skipped: report.skipped.len(),
                failed: report.failed.len(),
            };
            progress.step("updating", name, index, total, tally).await;

            match self.update_one(name).await {
                Ok(UpdateStep::Updated) => {
                    report.updated.push(name.clone());
                    if !self.update_pause.is_zero() {
                        tokio::time::sleep(self.update_pause).await;
                    }
                }
                Ok(UpdateStep::Skipped(reason)) => {
                    tracing::info!("skipped update of {name}: {reason}");
                    report.skipped.push((name.clone(), reason));
                }
                Err(err) => {
                    tracing::warn!("update {name} failed: {err}");
                    report.failed.push(Failure::new(name.clone(), err));
                }
            }
        }

        self.reload().await;
        tracing::info!(
            "update finished: {} updated, {} skipped, {} failed",
            report.updated.len(),
            report.skipped.len(),
            report.failed.len()
        );

        let max_shown = progress.settings().max_failures_shown;
        progress.finish(&report.render(max_shown)).await;
        report
    }

    async fn update_one(&mut self, name: &str) -> PluginResult<UpdateStep> {
        let Some(url) = self
            .database
            .get(name)
            .filter(|record| record.has_url())
            .map(|record| record.url.clone())
        else {
            return Ok(UpdateStep::Skipped(SkipReason::NoUrl));
        };

        if !self.store.contains(name) {
            return Ok(UpdateStep::Skipped(SkipReason::NotInstalled));
        }

        let fresh = self.registry.download(name, &url).await?;
        let current = self.store.read(name)?;
        if current == fresh {
            return Ok(UpdateStep::Skipped(SkipReason::Unchanged));
        }

        self.backups.backup_before_overwrite(&self.store, name)?;
        self.store.write(name, &fresh)?;

        if let Some(record) = self.database.get_mut(name) {
            record.touch();
        }
        self.flush_database();
        tracing::info!("updated plugin {name} from {url}");

        Ok(UpdateStep::Updated)
    }
}
