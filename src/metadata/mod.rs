//! Off-chain metadata resolution.
//!
//! A token URI points at a JSON document (usually IPFS-gated HTTP). The
//! fetch is strictly best-effort: a missing, non-200 or malformed document
//! leaves the record's metadata unset, it never fails a sync batch.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use url::Url;

use crate::types::IpMetadata;

/// Token-scoped failure fetching or parsing a metadata document.
#[derive(Debug, thiserror::Error)]
pub enum MetadataFetchError {
    #[error("token URI is not a fetchable URL: {0}")]
    BadUri(String),

    #[error("metadata request failed: {0}")]
    Http(String),

    #[error("metadata endpoint returned HTTP {0}")]
    Status(u16),

    #[error("metadata document is not the expected JSON shape: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MetadataFetcher: Send + Sync + 'static {
    async fn fetch(&self, token_uri: &str) -> Result<IpMetadata, MetadataFetchError>;
}

/// Shared HTTP client; metadata hosts are slow enough without a handshake
/// per token.
static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .gzip(true)
        .build()
        .unwrap_or_else(|_| Client::new())
});

pub struct HttpMetadataFetcher {
    timeout: Duration,
}

impl HttpMetadataFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, token_uri: &str) -> Result<IpMetadata, MetadataFetchError> {
        let url =
            Url::parse(token_uri).map_err(|e| MetadataFetchError::BadUri(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, HTTP.get(url).send())
            .await
            .map_err(|_| MetadataFetchError::Http("timed out".into()))?
            .map_err(|e| MetadataFetchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MetadataFetchError::Status(response.status().as_u16()));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MetadataFetchError::Malformed(e.to_string()))?;
        parse_metadata(&value)
    }
}

/// Pull the known fields out of the document, tolerating extras and
/// defaulting absent ones to empty strings.
pub fn parse_metadata(value: &serde_json::Value) -> Result<IpMetadata, MetadataFetchError> {
    if !value.is_object() {
        return Err(MetadataFetchError::Malformed(
            "document is not a JSON object".into(),
        ));
    }
    let field = |name: &str| {
        value
            .get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(IpMetadata {
        title: field("title"),
        description: field("description"),
        category: field("category"),
        attribution: field("attribution"),
        image: field("image"),
    })
}
