//! Mock remote services for deterministic testing.
//!
//! ## Usage
//!
//! ```ignore
//! use recognizer_core::{RecognizerIdentifier, RecognizerResponse};
//! use recognizer_remote::mock::{MockClassifier, MockLookup};
//!
//! let classifier = MockClassifier::new(RecognizerResponse {
//!     isbn: Some("9780136091813".into()),
//!     ..Default::default()
//! });
//! let lookup = MockLookup::new().with_item(
//!     "9780136091813",
//!     serde_json::json!([{"itemType": "book", "title": "Example"}]),
//! );
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use recognizer_core::{
    Error, IdentifierLookup, RecognizerIdentifier, RecognizerResponse, RemoteClassifier, Result,
};

/// Recorded call to a mock service.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

fn record(log: &Mutex<Vec<MockCall>>, operation: &str, input: String) {
    log.lock().unwrap().push(MockCall {
        operation: operation.to_string(),
        input,
        timestamp: std::time::Instant::now(),
    });
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Mock classifier returning a fixed response or a fixed failure.
#[derive(Clone)]
pub struct MockClassifier {
    outcome: std::result::Result<RecognizerResponse, String>,
    latency: Duration,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockClassifier {
    pub fn new(response: RecognizerResponse) -> Self {
        Self {
            outcome: Ok(response),
            latency: Duration::ZERO,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Classifier whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            latency: Duration::ZERO,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Delay every response (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClassifier for MockClassifier {
    async fn classify(&self, data: &JsonValue) -> Result<RecognizerResponse> {
        record(&self.call_log, "classify", data.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcome.clone().map_err(Error::Request)
    }
}

// =============================================================================
// LOOKUP
// =============================================================================

/// Scripted outcome for one identifier.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Item(JsonValue),
    /// Transport or server failure.
    Fail(String),
    /// Service rejected the identifier.
    Reject,
}

/// Mock identifier lookup keyed by identifier value.
///
/// Identifiers without a scripted outcome resolve to `Error::NotFound`.
#[derive(Clone, Default)]
pub struct MockLookup {
    outcomes: HashMap<String, LookupOutcome>,
    latency: Duration,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, identifier: impl Into<String>, item: JsonValue) -> Self {
        self.outcomes
            .insert(identifier.into(), LookupOutcome::Item(item));
        self
    }

    pub fn with_failure(
        mut self,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.outcomes
            .insert(identifier.into(), LookupOutcome::Fail(message.into()));
        self
    }

    pub fn with_rejection(mut self, identifier: impl Into<String>) -> Self {
        self.outcomes.insert(identifier.into(), LookupOutcome::Reject);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Identifiers looked up so far, in call order (`"doi:10.1/x"` form).
    pub fn looked_up(&self) -> Vec<String> {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.input.clone())
            .collect()
    }
}

#[async_trait]
impl IdentifierLookup for MockLookup {
    async fn lookup(&self, identifier: &RecognizerIdentifier) -> Result<JsonValue> {
        record(&self.call_log, "lookup", identifier.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.outcomes.get(identifier.value()) {
            Some(LookupOutcome::Item(item)) => Ok(item.clone()),
            Some(LookupOutcome::Fail(message)) => Err(Error::Request(message.clone())),
            Some(LookupOutcome::Reject) => Err(Error::InvalidInput(format!(
                "Identifier rejected: {}",
                identifier
            ))),
            None => Err(Error::NotFound(format!("No item found for {}", identifier))),
        }
    }
}
