use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::manifest::Catalog;

/// Single GET of a remote document.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> PluginResult<Vec<u8>>;
}

/// `reqwest` fetcher. Non-2xx responses are network errors.
///
/// `retries` defaults to zero, i.e. one attempt per request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, retries: u32, backoff: Duration) -> PluginResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| PluginError::network("<client>", err))?;

        Ok(Self {
            client,
            retries,
            backoff,
        })
    }

    async fn get_once(&self, url: &str) -> PluginResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|err| PluginError::network(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::network(url, status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| PluginError::network(url, err))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> PluginResult<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!("GET {url} failed (attempt {attempt}): {err}");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Reads the remote catalog and plugin sources. Nothing is cached between
/// calls.
#[derive(Clone)]
pub struct RegistryClient {
    catalog_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl RegistryClient {
    pub fn new(catalog_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            fetcher,
        }
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub async fn fetch_catalog(&self) -> PluginResult<Catalog> {
        let body = self.fetcher.get(&self.catalog_url).await?;
        let catalog = Catalog::from_json(&body)?;
        tracing::debug!("catalog {} lists {} plugins", self.catalog_url, catalog.len());
        Ok(catalog)
    }

    /// Download a plugin source. `name` only labels the error.
    pub async fn download(&self, name: &str, url: &str) -> PluginResult<Vec<u8>> {
        if url.trim().is_empty() {
            return Err(PluginError::MissingUrl(name.to_string()));
        }
        self.fetcher.get(url).await
    }
}
