//! Collaborator interfaces consumed by the worker pool and the pipeline.
//!
//! These traits define the seams to the extraction engine, the remote
//! services, and storage so each can be swapped for a fake in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::identifiers::{RecognizerIdentifier, RecognizerResponse};
use crate::item::ParsedItem;
use crate::models::LibraryId;

// =============================================================================
// EXTRACTION ENGINE
// =============================================================================

/// A live extraction engine instance.
///
/// Each call is one-shot. Dropping the returned future cancels the call.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Structured recognition data for the remote classifier.
    async fn run_recognizer(&self, file: &Path) -> Result<JsonValue>;

    /// Text of the given 0-based pages, or of the whole document.
    async fn run_full_text(&self, file: &Path, pages: Option<&[u32]>) -> Result<JsonValue>;
}

/// Creates engine instances. Start-up is the expensive part.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    async fn start(&self) -> Result<Arc<dyn Engine>>;

    /// Human-readable name of this engine.
    fn name(&self) -> &str;
}

// =============================================================================
// REMOTE SERVICES
// =============================================================================

/// Remote service that turns extracted data into metadata and identifiers.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify(&self, data: &JsonValue) -> Result<RecognizerResponse>;
}

/// Resolves one structured identifier into translator item JSON.
///
/// Returns `Error::InvalidInput` when the service rejects the identifier.
#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    async fn lookup(&self, identifier: &RecognizerIdentifier) -> Result<JsonValue>;
}

// =============================================================================
// STORAGE
// =============================================================================

/// Outcome of the parent-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedParent {
    /// Key of the newly created parent item.
    pub parent_key: String,
    /// Where the attachment's file is expected on disk, if it has one.
    pub attachment_file: Option<PathBuf>,
}

/// Item storage.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// In one transaction: create `item` as a new top-level item, move the
    /// attachment `attachment_key` under it, and set the attachment's title.
    async fn create_parent(
        &self,
        library_id: LibraryId,
        attachment_key: &str,
        item: &ParsedItem,
        attachment_title: &str,
    ) -> Result<CreatedParent>;

    /// Record a new filename for the attachment's file.
    async fn rename_attachment_file(
        &self,
        library_id: LibraryId,
        attachment_key: &str,
        filename: &str,
    ) -> Result<()>;
}

/// File storage holding attachment files.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    /// Move `from` to `to`. Must not overwrite an existing file.
    async fn move_file(&self, from: &Path, to: &Path) -> Result<()>;
}
