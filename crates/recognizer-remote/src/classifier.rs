//! HTTP client for the remote recognizer (classifier) service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use recognizer_core::defaults::{RECOGNIZER_TIMEOUT_SECS, RECOGNIZER_URL};
use recognizer_core::{Error, RecognizerResponse, RemoteClassifier, Result};

/// Configuration for [`RecognizerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Service base URL, without the `/recognize` suffix.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: RECOGNIZER_URL.to_string(),
            timeout_secs: RECOGNIZER_TIMEOUT_SECS,
        }
    }
}

impl ClassifierConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RECOGNIZER_URL` | `https://services.zotero.org/recognizer` | Service base URL |
    /// | `RECOGNIZER_TIMEOUT_SECS` | `30` | Request timeout |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("RECOGNIZER_URL").unwrap_or_else(|_| RECOGNIZER_URL.to_string());
        let timeout_secs = std::env::var("RECOGNIZER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(RECOGNIZER_TIMEOUT_SECS);

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

/// Client for the recognizer service's `POST /recognize` endpoint.
pub struct RecognizerClient {
    client: Client,
    base_url: String,
}

impl RecognizerClient {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            url = %base_url,
            timeout_secs = config.timeout_secs,
            "Initializing recognizer client"
        );

        Ok(Self { client, base_url })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClassifierConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RemoteClassifier for RecognizerClient {
    #[instrument(skip(self, data), fields(subsystem = "remote"))]
    async fn classify(&self, data: &JsonValue) -> Result<RecognizerResponse> {
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/recognize", self.base_url))
            .json(data)
            .send()
            .await
            .map_err(|e| Error::Request(format!("Recognizer request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Recognizer returned an error status");
            return Err(Error::Request(format!(
                "Recognizer returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: RecognizerResponse = response.json().await.map_err(|e| {
            Error::Serialization(format!("Failed to parse recognizer response: {}", e))
        })?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            has_title = parsed.title.is_some(),
            identifier_count = parsed.identifiers().len(),
            "Recognizer response received"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClassifierConfig::default();
        assert_eq!(config.base_url, RECOGNIZER_URL);
        assert_eq!(config.timeout_secs, RECOGNIZER_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_builder() {
        let config = ClassifierConfig::default()
            .with_base_url("http://localhost:9000")
            .with_timeout_secs(5);
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client =
            RecognizerClient::new(ClassifierConfig::default().with_base_url("http://x/api/")).unwrap();
        assert_eq!(client.base_url(), "http://x/api");
    }
}
