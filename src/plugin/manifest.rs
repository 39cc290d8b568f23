use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::plugin::error::{PluginError, PluginResult};

/// One installable plugin as published by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

impl CatalogEntry {
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalogEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    desc: Option<String>,
}

/// The remote catalog, kept in document order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parse the flat `{ name: { url, desc? } }` catalog document.
    pub fn from_json(bytes: &[u8]) -> PluginResult<Self> {
        let document: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(bytes).map_err(|err| PluginError::Parse(err.to_string()))?;

        let entries = document
            .into_iter()
            .map(|(name, value)| {
                let raw: RawCatalogEntry = serde_json::from_value(value)
                    .map_err(|err| PluginError::Parse(format!("{name}: {err}")))?;
                Ok(CatalogEntry {
                    name,
                    url: raw.url.unwrap_or_default(),
                    description: raw.desc.filter(|desc| !desc.is_empty()),
                })
            })
            .collect::<PluginResult<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Proof that a plugin file was fetched from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "_updatedAt", default)]
    pub updated_at: i64,
}

impl PluginRecord {
    pub fn from_catalog(entry: &CatalogEntry) -> Self {
        Self {
            url: entry.url.clone(),
            desc: entry.description.clone(),
            updated_at: now_millis(),
        }
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.updated_at).single()
    }
}

/// Derived classification of a catalog name against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Installed,
    LocalOnly,
    NotInstalled,
}

impl PluginStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            PluginStatus::Installed => "✅",
            PluginStatus::LocalOnly => "🔶",
            PluginStatus::NotInstalled => "❌",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PluginStatus::Installed => "installed",
            PluginStatus::LocalOnly => "local only",
            PluginStatus::NotInstalled => "not installed",
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
