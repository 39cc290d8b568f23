use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::model::config::AppConfig;
use crate::msg::Msg;
use crate::plugin::PluginManager;
use crate::plugin::host_fns::{AttachmentSource, FileAttachment, ProgressSink};

pub const HELP: &str = "\
📦 tpm - plugin manager

🔍 browse
  tpm search [query]        (alias: s)     remote catalog with install status
  tpm ls [-v]               (alias: list)  installed records; -v or `lv` for details

⬇️ install
  tpm i <name>              (alias: install)
  tpm i <name1> <name2> ...
  tpm i all                 install the whole catalog
  tpm i -f <file>           install a local plugin file (not tracked for updates)

🔄 update
  tpm update                (alias: updateAll, ua)  refresh catalog-installed plugins

🗑 uninstall
  tpm rm <name> [...]       (alias: remove, uninstall, un)
  tpm rm all                clear the plugin directory and all records

⬆️ export
  tpm ul <name> [dest]      (alias: upload, export)  copy a plugin file out

options
  --config <path>           use this config file instead of the platform one";

pub struct App {
    pub manager: PluginManager,
}

impl App {
    pub fn new(config: &AppConfig, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let manager = PluginManager::from_config(config)?.with_sink(sink);
        Ok(Self { manager })
    }

    pub fn with_manager(manager: PluginManager, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            manager: manager.with_sink(sink),
        }
    }

    // ── Update ───────────────────────────────────────────────────

    /// Run one request. Outcomes are shown through the sink; an `Err` means
    /// the request (or part of a batch) failed and the process should exit
    /// non-zero.
    pub async fn update(&mut self, msg: Msg) -> Result<()> {
        tracing::debug!("handling {msg:?}");

        match msg {
            Msg::Install(names) => match names.as_slice() {
                [name] => {
                    self.manager
                        .install_from_catalog(name)
                        .await
                        .with_context(|| format!("install {name}"))?;
                }
                _ => {
                    let report = self.manager.install_batch(&names).await?;
                    ensure_clean("install", report.failed.len(), report.total)?;
                }
            },
            Msg::InstallAll => {
                let report = self.manager.install_all().await?;
                ensure_clean("install", report.failed.len(), report.total)?;
            }
            Msg::InstallFile(path) => self.install_file(FileAttachment::new(path)).await?,
            Msg::Uninstall(names) => match names.as_slice() {
                [] => {
                    self.notify("❌ give the plugin names to uninstall").await;
                    bail!("no plugin names given");
                }
                [name] => {
                    self.manager
                        .uninstall_one(name)
                        .await
                        .with_context(|| format!("uninstall {name}"))?;
                }
                _ => {
                    let report = self.manager.uninstall_batch(&names).await;
                    ensure_clean("uninstall", report.failed.len(), names.len())?;
                }
            },
            Msg::UninstallAll => {
                let report = self.manager.uninstall_all().await;
                ensure_clean(
                    "uninstall",
                    report.failed.len(),
                    report.removed + report.failed.len(),
                )?;
            }
            Msg::Update => {
                let report = self.manager.update_all().await;
                ensure_clean("update", report.failed.len(), report.total)?;
            }
            Msg::Search(query) => {
                self.notify("🔍 fetching plugin list...").await;
                match self.manager.search(query.as_deref()).await {
                    Ok(report) => self.notify(&report.render()).await,
                    Err(err) => {
                        self.notify(&format!("❌ cannot fetch remote plugin catalog: {err}"))
                            .await;
                        return Err(err).context("search");
                    }
                }
            }
            Msg::List { verbose } => {
                let text = self.manager.list().render(verbose);
                self.notify(&text).await;
            }
            Msg::Export { name, dest } => match self.manager.export(&name, &dest) {
                Ok(path) => {
                    self.notify(&format!("✅ plugin {name} exported to {}", path.display()))
                        .await;
                }
                Err(err) => {
                    self.notify(&format!("❌ cannot export {name}: {err}")).await;
                    return Err(err).with_context(|| format!("export {name}"));
                }
            },
            Msg::Help => self.notify(HELP).await,
            Msg::Unknown(command) => {
                self.notify(&format!("❌ unknown command: {command}\n\n{HELP}"))
                    .await;
                bail!("unknown command: {command}");
            }
        }

        Ok(())
    }

    async fn install_file(&mut self, source: impl AttachmentSource) -> Result<()> {
        match source.attachment().await {
            Ok(Some(attachment)) => {
                let name = attachment.file_name.clone();
                self.manager
                    .install_attachment(attachment)
                    .await
                    .with_context(|| format!("install {name}"))?;
                Ok(())
            }
            Ok(None) => {
                self.notify("❌ give a plugin name, or a plugin file with `tpm i -f <file>`")
                    .await;
                bail!("no plugin name or file given");
            }
            Err(err) => {
                self.notify(&format!("❌ cannot read plugin file: {err:#}")).await;
                Err(err)
            }
        }
    }

    async fn notify(&self, text: &str) {
        self.manager.reporter().finish(text).await;
    }
}

fn ensure_clean(operation: &str, failed: usize, total: usize) -> Result<()> {
    if failed > 0 {
        bail!("{operation}: {failed} of {total} plugins failed");
    }
    Ok(())
}
