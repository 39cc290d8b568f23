use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type PluginResult<T> = Result<T, PluginError>;

/// Failure of a single lifecycle step. The `Display` text doubles as the
/// per-item reason shown in batch summaries.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("malformed catalog: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no source URL")]
    MissingUrl(String),

    #[error("{}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("version database: {0}")]
    Database(String),

    #[error("empty name")]
    EmptyName,

    #[error("invalid plugin name: {0}")]
    InvalidName(String),

    #[error("no plugin file attached")]
    NoAttachment,
}

impl PluginError {
    pub fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub fn network(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Catalog lookups and missing files both surface as not-found; batch
    /// summaries list them apart from other failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
