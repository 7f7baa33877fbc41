//! Structured logging field names.
//!
//! All crates use these constants for consistent structured logging fields
//! so pool and pipeline events can be correlated by field name.
//!
//! ## Log Level Contract
//!
//! | Level | Usage | Typical fields |
//! |-------|-------|----------------|
//! | ERROR | Storage failures, work that cannot be attributed to a task | [`LIBRARY_ID`], [`ITEM_KEY`], [`ERROR_MSG`] |
//! | WARN  | Per-candidate lookup failures, discarded stale completions | [`TASK_FILE`], [`IDENTIFIER`], [`WORKER_ID`], [`ERROR_MSG`] |
//! | INFO  | Task terminal outcomes, pool lifecycle | [`SUBSYSTEM`], [`TASK_FILE`] |
//! | DEBUG | State transitions, admission decisions | [`WORKER_ID`], [`WORK`], [`TIER`], [`STATE`], [`DURATION_MS`] |
//! | TRACE | Per-event fan-out | [`SUBSYSTEM`] |
//!
//! `tracing` macros take field names as identifiers, so call sites spell
//! these names out; the constants are the single list to keep them in line.

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event ("pool", "pipeline", "remote", "engine").
pub const SUBSYSTEM: &str = "subsystem";

/// Worker UUID.
pub const WORKER_ID: &str = "worker_id";

/// Input file of a worker or task.
pub const TASK_FILE: &str = "task_file";

/// Unit of work ("recognizer", "full_text").
pub const WORK: &str = "work";

/// Priority tier ("default", "high").
pub const TIER: &str = "tier";

/// Worker or task state after a transition.
pub const STATE: &str = "state";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Candidate identifier being resolved.
pub const IDENTIFIER: &str = "identifier";

/// Library that owns the attachment.
pub const LIBRARY_ID: &str = "library_id";

/// Attachment item key.
pub const ITEM_KEY: &str = "item_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
