use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::plugin::error::PluginError;
use crate::plugin::manifest::{PluginRecord, PluginStatus};
use crate::plugin::progress::progress_bar;

const UNINSTALL_ALL_FAILURES_SHOWN: usize = 10;

#[derive(Debug)]
pub struct Failure {
    pub name: String,
    pub error: PluginError,
}

impl Failure {
    pub fn new(name: impl Into<String>, error: PluginError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn line(&self) -> String {
        format!("{} ({})", self.name, self.error)
    }
}

/// Outcome of a single install (catalog or attachment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub name: String,
    pub backup: Option<PathBuf>,
    /// An attachment replaced a catalog-tracked plugin; it no longer updates.
    pub dropped_record: bool,
}

impl InstallOutcome {
    pub fn render(&self) -> String {
        let mut text = format!("✅ plugin {} installed", self.name);
        if self.dropped_record {
            text.push_str(&format!(
                "\n⚠️ replaced a catalog-installed plugin; run `tpm i {}` to keep receiving updates",
                self.name
            ));
        }
        text
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<Failure>,
    pub reloaded: bool,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|failure| failure.name.as_str()).collect()
    }

    pub fn render(&self, max_shown: usize, bar_width: usize) -> String {
        let mut text = format!(
            "🎉 batch install finished\n\n{}\n\n✅ installed: {}/{}\n❌ failed: {}/{}",
            progress_bar(100, bar_width),
            self.succeeded.len(),
            self.total,
            self.failed.len(),
            self.total
        );

        let (not_found, other): (Vec<&Failure>, Vec<&Failure>) = self
            .failed
            .iter()
            .partition(|failure| failure.error.is_not_found());

        if !not_found.is_empty() {
            let names: Vec<String> = not_found.iter().map(|f| f.name.clone()).collect();
            text.push_str("\n\n🔍 not in catalog:");
            text.push_str(&capped_list(&names, max_shown));
        }
        if !other.is_empty() {
            let lines: Vec<String> = other.iter().map(|f| f.line()).collect();
            text.push_str("\n\n❌ failures:");
            text.push_str(&capped_list(&lines, max_shown));
        }

        if self.reloaded {
            text.push_str("\n\n🔄 plugins reloaded");
        } else {
            text.push_str("\n\n⚠️ plugin reload failed; see the log");
        }
        text
    }
}

#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<String>,
    pub failed: Vec<Failure>,
}

impl UninstallReport {
    pub fn render(&self) -> String {
        let mut text = format!(
            "📊 uninstall finished\n\n✅ removed: {}\n❌ failed: {}",
            self.removed.len(),
            self.failed.len()
        );
        if !self.removed.is_empty() {
            text.push_str("\n\n✅ removed:");
            for name in &self.removed {
                text.push_str(&format!("\n  • {name}"));
            }
        }
        if !self.failed.is_empty() {
            text.push_str("\n\n❌ not removed:");
            for failure in &self.failed {
                text.push_str(&format!("\n  • {}: {}", failure.name, failure.error));
            }
        }
        text
    }
}

#[derive(Debug, Default)]
pub struct UninstallAllReport {
    pub removed: usize,
    pub failed: Vec<String>,
    pub records_cleared: usize,
}

impl UninstallAllReport {
    pub fn render(&self) -> String {
        let mut text = format!(
            "✅ plugin directory cleared\n\n🗑 files removed: {}\n📚 records cleared: {}",
            self.removed, self.records_cleared
        );
        if !self.failed.is_empty() {
            text.push_str(&format!("\n❌ could not remove: {}", self.failed.len()));
            text.push_str(&capped_list(&self.failed, UNINSTALL_ALL_FAILURES_SHOWN));
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoUrl,
    NotInstalled,
    Unchanged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NoUrl => "no source URL",
            SkipReason::NotInstalled => "not installed locally",
            SkipReason::Unchanged => "unchanged",
        })
    }
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub total: usize,
    pub updated: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<Failure>,
}

impl UpdateReport {
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|(_, why)| *why == reason).count()
    }

    pub fn render(&self, max_shown: usize) -> String {
        if self.total == 0 {
            return "📦 no catalog-installed plugins recorded".to_string();
        }

        let mut text = format!(
            "✅ update finished: {} updated, {} skipped, {} failed",
            self.updated.len(),
            self.skipped.len(),
            self.failed.len()
        );
        if !self.updated.is_empty() {
            text.push_str(&format!("\n⬆️ {}", self.updated.join(", ")));
        }
        if !self.failed.is_empty() {
            let lines: Vec<String> = self.failed.iter().map(|f| f.line()).collect();
            text.push_str("\n❌ failures:");
            text.push_str(&capped_list(&lines, max_shown));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub name: String,
    pub status: PluginStatus,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct SearchReport {
    pub catalog_url: String,
    pub rows: Vec<SearchRow>,
}

impl SearchReport {
    pub fn count(&self, status: PluginStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "🔍 remote plugins".to_string(),
            "━━━━━━━━━━━━━━━━━".to_string(),
            String::new(),
            format!("📊 total: {}", self.rows.len()),
            format!(
                "• {} installed: {}",
                PluginStatus::Installed.marker(),
                self.count(PluginStatus::Installed)
            ),
            format!(
                "• {} local only: {}",
                PluginStatus::LocalOnly.marker(),
                self.count(PluginStatus::LocalOnly)
            ),
            format!(
                "• {} not installed: {}",
                PluginStatus::NotInstalled.marker(),
                self.count(PluginStatus::NotInstalled)
            ),
            String::new(),
        ];

        lines.extend(self.rows.iter().map(|row| {
            format!(
                "{} {} - {}",
                row.status.marker(),
                row.name,
                row.description.as_deref().unwrap_or("no description")
            )
        }));

        lines.push(String::new());
        lines.push(format!("🔗 catalog: {}", self.catalog_url));
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlugin {
    pub name: String,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
pub struct ListReport {
    /// Newest first.
    pub records: Vec<(String, PluginRecord)>,
    /// Files on disk without a record.
    pub local: Vec<LocalPlugin>,
}

impl ListReport {
    pub fn render(&self, verbose: bool) -> String {
        let mut lines = vec![
            "📚 plugin records".to_string(),
            "━━━━━━━━━━━━━━━━━".to_string(),
        ];

        if !verbose {
            lines.push(String::new());
            lines.push("💡 use `tpm ls -v` for details".to_string());
        }

        lines.push(String::new());
        if self.records.is_empty() {
            lines.push("📦 catalog plugins: (none)".to_string());
        } else {
            lines.push(format!("📦 catalog plugins ({}):", self.records.len()));
            for (name, record) in &self.records {
                lines.push(render_record(name, record, verbose));
            }
        }

        if !self.local.is_empty() {
            lines.push(String::new());
            lines.push(format!("🗂 local plugins ({}):", self.local.len()));
            for plugin in &self.local {
                if verbose {
                    let modified = plugin
                        .modified
                        .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    lines.push(format!("{} 🗄 {modified}", plugin.name));
                } else {
                    lines.push(plugin.name.clone());
                }
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "📊 total: {} plugins",
            self.records.len() + self.local.len()
        ));
        lines.join("\n")
    }
}

fn render_record(name: &str, record: &PluginRecord, verbose: bool) -> String {
    if !verbose {
        return match record.desc.as_deref() {
            Some(desc) => format!("{name} - {desc}"),
            None => name.to_string(),
        };
    }

    let updated = record
        .updated_at_utc()
        .map(|time| time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut line = format!("{name} 🕒 {updated}");
    if let Some(desc) = record.desc.as_deref() {
        line.push_str(&format!("\n  📝 {desc}"));
    }
    line.push_str(&format!("\n  🔗 {}", record.url));
    line
}

fn capped_list(items: &[String], max_shown: usize) -> String {
    let mut text = String::new();
    for item in items.iter().take(max_shown) {
        text.push_str(&format!("\n• {item}"));
    }
    if items.len() > max_shown {
        text.push_str(&format!("\n• ... and {} more", items.len() - max_shown));
    }
    text
}
