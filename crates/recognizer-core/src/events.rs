//! Update events emitted by the worker pool and the recognition pipeline.
//!
//! Both components hand out `tokio::sync::broadcast` receivers of these
//! events. A stream ends after exactly one terminal update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::RecognitionError;
use crate::item::ParsedItem;
use crate::models::{Task, Work, WorkerId};

// ============================================================================
// Worker pool
// ============================================================================

/// What happened to a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum WorkUpdateKind {
    Failed(RecognitionError),
    Cancelled,
    InProgress,
    ExtractedData(JsonValue),
}

impl WorkUpdateKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkUpdateKind::InProgress)
    }
}

/// Update for one `(worker, work)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkUpdate {
    pub worker_id: WorkerId,
    pub work: Work,
    pub kind: WorkUpdateKind,
}

impl WorkUpdate {
    pub fn new(worker_id: WorkerId, work: Work, kind: WorkUpdateKind) -> Self {
        Self {
            worker_id,
            work,
            kind,
        }
    }
}

// ============================================================================
// Recognition pipeline
// ============================================================================

/// What happened to a recognition task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TaskUpdateKind {
    Failed(RecognitionError),
    Cancelled,
    Enqueued,
    InProgress,
    Translated(ParsedItem),
    CreatedParent(ParsedItem),
}

impl TaskUpdateKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskUpdateKind::Enqueued | TaskUpdateKind::InProgress)
    }

    /// Dot-namespaced event type (e.g. `"task.translated"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskUpdateKind::Failed(_) => "task.failed",
            TaskUpdateKind::Cancelled => "task.cancelled",
            TaskUpdateKind::Enqueued => "task.enqueued",
            TaskUpdateKind::InProgress => "task.in_progress",
            TaskUpdateKind::Translated(_) => "task.translated",
            TaskUpdateKind::CreatedParent(_) => "task.created_parent",
        }
    }
}

/// Update for one recognition task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskUpdate {
    pub task: Task,
    pub kind: TaskUpdateKind,
    pub occurred_at: DateTime<Utc>,
}

impl TaskUpdate {
    pub fn new(task: Task, kind: TaskUpdateKind) -> Self {
        Self {
            task,
            kind,
            occurred_at: Utc::now(),
        }
    }
}
