//! Worker, work, and task value types shared by the pool and the pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::identifiers::{RecognizerIdentifier, RecognizerResponse};

// =============================================================================
// WORKER POOL TYPES
// =============================================================================

/// Opaque worker identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Create a fresh, time-ordered worker id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Priority tier controlling how many workers of the class may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Default,
    High,
}

impl Priority {
    /// Tiers in admission order, highest first.
    pub const DESCENDING: [Priority; 2] = [Priority::High, Priority::Default];

    /// Built-in cap on concurrently running workers for this tier.
    pub fn default_max_running(self) -> usize {
        match self {
            Priority::Default => defaults::DEFAULT_TIER_MAX_RUNNING,
            Priority::High => defaults::HIGH_TIER_MAX_RUNNING,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Default => "default",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of extraction requested of a worker.
///
/// Equal values queued on the same worker share a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Work {
    /// Structured recognition data for the remote classifier.
    Recognizer,
    /// Plain text of the given 0-based pages, or of the whole document.
    FullText { pages: Option<Vec<u32>> },
}

impl Work {
    pub fn as_str(&self) -> &'static str {
        match self {
            Work::Recognizer => "recognizer",
            Work::FullText { .. } => "full_text",
        }
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::FullText { pages: Some(pages) } => write!(f, "full_text{:?}", pages),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No engine, nothing queued.
    Pending,
    /// Engine initializing.
    Preparing,
    /// Has unstarted work, waiting on admission.
    Queued,
    /// Executing one work item.
    Running,
    /// Engine alive, no pending work.
    Ready,
    /// Last attempt errored; the next enqueue prepares a fresh engine.
    Failed,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Pending => "pending",
            WorkerState::Preparing => "preparing",
            WorkerState::Queued => "queued",
            WorkerState::Running => "running",
            WorkerState::Ready => "ready",
            WorkerState::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-side descriptor of a pool worker.
///
/// The pool keeps the live state (engine, pending work) keyed by [`WorkerId`];
/// this value is only a handle and can be cloned freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub file: PathBuf,
    /// Keep completed payloads so identical work is answered without the engine.
    pub cache_data: bool,
    pub priority: Priority,
}

impl Worker {
    pub fn new(file: impl Into<PathBuf>, priority: Priority) -> Self {
        Self {
            id: WorkerId::new(),
            file: file.into(),
            cache_data: false,
            priority,
        }
    }

    pub fn with_cache_data(mut self, cache_data: bool) -> Self {
        self.cache_data = cache_data;
        self
    }
}

// =============================================================================
// PIPELINE TYPES
// =============================================================================

/// Library that owns an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum LibraryId {
    User(i64),
    Group(i64),
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryId::User(id) => write!(f, "u{}", id),
            LibraryId::Group(id) => write!(f, "g{}", id),
        }
    }
}

/// What to do with a recognized item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Report the item only.
    Simple,
    /// Create the item as parent of the attachment `key` in `library_id`.
    CreateParentForItem { library_id: LibraryId, key: String },
}

/// One end-to-end recognition request. Identity is `(file, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub file: PathBuf,
    pub kind: TaskKind,
}

impl Task {
    pub fn simple(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            kind: TaskKind::Simple,
        }
    }

    pub fn create_parent(
        file: impl Into<PathBuf>,
        library_id: LibraryId,
        key: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            kind: TaskKind::CreateParentForItem {
                library_id,
                key: key.into(),
            },
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// `(library, key)` of the attachment this task reparents, if any.
    pub fn parent_target(&self) -> Option<(LibraryId, &str)> {
        match &self.kind {
            TaskKind::Simple => None,
            TaskKind::CreateParentForItem { library_id, key } => Some((*library_id, key.as_str())),
        }
    }
}

/// Stage a live task is in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum TaskState {
    Enqueued,
    RecognitionInProgress,
    RemoteRecognitionInProgress {
        data: JsonValue,
    },
    IdentifiersLookupInProgress {
        response: RecognizerResponse,
        current: RecognizerIdentifier,
        pending: Vec<RecognizerIdentifier>,
    },
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Enqueued => "enqueued",
            TaskState::RecognitionInProgress => "recognition_in_progress",
            TaskState::RemoteRecognitionInProgress { .. } => "remote_recognition_in_progress",
            TaskState::IdentifiersLookupInProgress { .. } => "identifiers_lookup_in_progress",
        }
    }

    /// Whether the task counts against the pipeline's concurrency cap.
    pub fn is_active(&self) -> bool {
        !matches!(self, TaskState::Enqueued)
    }
}
