use std::collections::HashSet;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::plugin::error::PluginResult;
use crate::plugin::manager::PluginManager;
use crate::plugin::manifest::{CatalogEntry, PluginRecord, PluginStatus};
use crate::plugin::report::{ListReport, LocalPlugin, SearchReport, SearchRow};

/// Installed only when the file exists and its record still points at the
/// catalog's current URL. A file without a record is local-only; anything
/// else, including a record whose URL the catalog has since re-pointed, is
/// not installed.
pub fn classify(
    has_file: bool,
    record: Option<&PluginRecord>,
    entry: Option<&CatalogEntry>,
) -> PluginStatus {
    match (has_file, record, entry) {
        (true, Some(record), Some(entry)) if record.url == entry.url => PluginStatus::Installed,
        (true, None, _) => PluginStatus::LocalOnly,
        _ => PluginStatus::NotInstalled,
    }
}

impl PluginManager {
    pub fn classify(&self, name: &str, entry: Option<&CatalogEntry>) -> PluginStatus {
        let has_file = self
            .local_names()
            .iter()
            .any(|local| local == name);
        classify(has_file, self.database.get(name), entry)
    }

    /// Classify every catalog entry, in catalog order. `query` keeps only
    /// entries whose name or description fuzzy-matches.
    pub async fn search(&self, query: Option<&str>) -> PluginResult<SearchReport> {
        let catalog = self.registry.fetch_catalog().await?;
        let local: HashSet<String> = self.local_names().into_iter().collect();
        let query = query.map(str::trim).filter(|query| !query.is_empty());
        let matcher = SkimMatcherV2::default();

        let rows = catalog
            .entries()
            .iter()
            .filter(|entry| {
                query.is_none_or(|query| {
                    let haystack = format!(
                        "{} {}",
                        entry.name,
                        entry.description.as_deref().unwrap_or_default()
                    );
                    matcher.fuzzy_match(&haystack, query).is_some()
                })
            })
            .map(|entry| SearchRow {
                name: entry.name.clone(),
                status: classify(
                    local.contains(&entry.name),
                    self.database.get(&entry.name),
                    Some(entry),
                ),
                description: entry.description.clone(),
            })
            .collect();

        Ok(SearchReport {
            catalog_url: self.registry.catalog_url().to_string(),
            rows,
        })
    }

    /// Recorded plugins, newest first, plus files on disk that have no
    /// record.
    pub fn list(&self) -> ListReport {
        let mut records: Vec<(String, PluginRecord)> = self
            .database
            .iter()
            .map(|(name, record)| (name.to_string(), record.clone()))
            .collect();
        records.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));

        let local = self
            .local_names()
            .into_iter()
            .filter(|name| !self.database.contains(name))
            .map(|name| LocalPlugin {
                modified: self.store.modified(&name),
                name,
            })
            .collect();

        ListReport { records, local }
    }

    fn local_names(&self) -> Vec<String> {
        self.store.list().unwrap_or_else(|err| {
            tracing::error!("cannot read plugin directory: {err}");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::Fixture;

    fn entry(url: &str) -> CatalogEntry {
        CatalogEntry {
            name: "foo".into(),
            url: url.into(),
            description: None,
        }
    }

    fn record(url: &str) -> PluginRecord {
        PluginRecord {
            url: url.into(),
            desc: None,
            updated_at: 0,
        }
    }

    #[test]
    fn classification_rules() {
        let u1 = entry("u1");
        assert_eq!(classify(true, Some(&record("u1")), Some(&u1)), PluginStatus::Installed);
        assert_eq!(classify(true, None, Some(&u1)), PluginStatus::LocalOnly);
        assert_eq!(classify(true, None, None), PluginStatus::LocalOnly);
        assert_eq!(classify(false, Some(&record("u1")), Some(&u1)), PluginStatus::NotInstalled);
        assert_eq!(classify(false, None, Some(&u1)), PluginStatus::NotInstalled);
        assert_eq!(classify(true, Some(&record("u1")), None), PluginStatus::NotInstalled);
    }

    #[tokio::test]
    async fn manual_file_is_local_only_and_repoint_flips_installed() {
        let fixture = Fixture::new();
        fixture.publish_raw(serde_json::json!({ "foo": { "url": "u1" } }));
        let mut manager = fixture.manager();
        manager.store().write("foo", b"manual").unwrap();

        let catalog = manager.registry.fetch_catalog().await.unwrap();
        assert_eq!(manager.classify("foo", catalog.get("foo")), PluginStatus::LocalOnly);

        manager.database.upsert("foo", record("u1"));
        assert_eq!(manager.classify("foo", catalog.get("foo")), PluginStatus::Installed);

        fixture.publish_raw(serde_json::json!({ "foo": { "url": "u2" } }));
        let catalog = manager.registry.fetch_catalog().await.unwrap();
        assert_eq!(manager.classify("foo", catalog.get("foo")), PluginStatus::NotInstalled);
    }

    #[tokio::test]
    async fn search_classifies_catalog_in_order_and_filters() {
        let fixture = Fixture::new();
        fixture.publish(&[("weather", "w"), ("echo", "e"), ("dice", "d")]);
        let mut manager = fixture.manager();
        manager.install_from_catalog("echo").await.unwrap();
        manager.store().write("dice", b"mine").unwrap();

        let report = manager.search(None).await.unwrap();
        let statuses: Vec<(&str, PluginStatus)> = report
            .rows
            .iter()
            .map(|row| (row.name.as_str(), row.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("weather", PluginStatus::NotInstalled),
                ("echo", PluginStatus::Installed),
                ("dice", PluginStatus::LocalOnly),
            ]
        );
        assert_eq!(report.rows[0].description.as_deref(), Some("about weather"));
        assert!(report.render().contains("✅ echo - about echo"));

        let filtered = manager.search(Some("wthr")).await.unwrap();
        assert_eq!(filtered.rows.len(), 1);
        assert_eq!(filtered.rows[0].name, "weather");
    }

    #[tokio::test]
    async fn list_sorts_records_newest_first_and_reports_local_files() {
        let fixture = Fixture::new();
        let mut manager = fixture.manager();
        for (name, at) in [("old", 10), ("new", 30), ("mid", 20)] {
            manager.store().write(name, b"x").unwrap();
            manager.database.upsert(
                name,
                PluginRecord {
                    url: format!("u-{name}"),
                    desc: None,
                    updated_at: at,
                },
            );
        }
        manager.store().write("handmade", b"x").unwrap();

        let report = manager.list();
        let order: Vec<&str> = report.records.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
        assert_eq!(report.local.len(), 1);
        assert_eq!(report.local[0].name, "handmade");
        assert!(report.local[0].modified.is_some());
        assert!(report.render(true).contains("handmade 🗄"));
    }
}
