//! Identifier lookup through a translation server's `POST /search` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};

use recognizer_core::defaults::{TRANSLATION_SERVER_URL, TRANSLATION_TIMEOUT_SECS};
use recognizer_core::{Error, IdentifierLookup, RecognizerIdentifier, Result};

/// Configuration for [`TranslationServerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: TRANSLATION_SERVER_URL.to_string(),
            timeout_secs: TRANSLATION_TIMEOUT_SECS,
        }
    }
}

impl LookupConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TRANSLATION_SERVER_URL` | `http://127.0.0.1:1969` | Translation server base URL |
    /// | `TRANSLATION_TIMEOUT_SECS` | `60` | Request timeout |
    pub fn from_env() -> Self {
        let base_url = std::env::var("TRANSLATION_SERVER_URL")
            .unwrap_or_else(|_| TRANSLATION_SERVER_URL.to_string());
        let timeout_secs = std::env::var("TRANSLATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(TRANSLATION_TIMEOUT_SECS);

        Self {
            base_url,
            timeout_secs,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Query text the translation server recognizes for an identifier.
fn search_query(identifier: &RecognizerIdentifier) -> Result<String> {
    match identifier {
        RecognizerIdentifier::Arxiv { id, .. } => Ok(format!("arXiv:{}", id)),
        RecognizerIdentifier::Doi { id, .. } | RecognizerIdentifier::Isbn { id, .. } => {
            Ok(id.clone())
        }
        RecognizerIdentifier::Title { .. } => Err(Error::InvalidInput(
            "Title identifiers are resolved from the classifier response".into(),
        )),
    }
}

/// Identifier lookup against a Zotero translation server.
pub struct TranslationServerClient {
    client: Client,
    base_url: String,
}

impl TranslationServerClient {
    pub fn new(config: LookupConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            url = %base_url,
            timeout_secs = config.timeout_secs,
            "Initializing translation server client"
        );

        Ok(Self { client, base_url })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LookupConfig::from_env())
    }
}

#[async_trait]
impl IdentifierLookup for TranslationServerClient {
    #[instrument(skip(self), fields(subsystem = "remote", identifier = %identifier))]
    async fn lookup(&self, identifier: &RecognizerIdentifier) -> Result<JsonValue> {
        let query = search_query(identifier)?;
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(query)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Lookup request failed: {}", e)))?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::NOT_IMPLEMENTED => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::InvalidInput(format!(
                    "Identifier rejected ({}): {}",
                    status,
                    body.trim()
                )));
            }
            StatusCode::MULTIPLE_CHOICES => {
                return Err(Error::Request(
                    "Lookup returned multiple choices for a single identifier".into(),
                ));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Request(format!(
                    "Translation server returned {}: {}",
                    status,
                    body.trim()
                )));
            }
        }

        let items: JsonValue = response.json().await.map_err(|e| {
            Error::Serialization(format!("Failed to parse lookup response: {}", e))
        })?;

        let empty = match &items {
            JsonValue::Array(list) => list.is_empty(),
            JsonValue::Null => true,
            _ => false,
        };
        if empty {
            return Err(Error::NotFound(format!("No item found for {}", identifier)));
        }

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Identifier lookup complete"
        );
        Ok(items)
    }
}
