//! Centralized default constants for the recognizer.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in the other crates read their fallbacks from here.

// =============================================================================
// WORKER POOL
// =============================================================================

/// Maximum concurrently running workers in the `default` tier.
pub const DEFAULT_TIER_MAX_RUNNING: usize = 1;

/// Maximum concurrently running workers in the `high` tier.
pub const HIGH_TIER_MAX_RUNNING: usize = 3;

/// Whether the pool keeps one idle engine warm while otherwise idle.
pub const POOL_PREWARM: bool = true;

/// Capacity of per-work and per-task broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// PIPELINE
// =============================================================================

/// Tasks allowed past the `enqueued` stage at the same time.
pub const PIPELINE_MAX_CONCURRENT_TASKS: usize = 1;

// =============================================================================
// REMOTE SERVICES
// =============================================================================

/// Default base URL of the remote recognizer (classifier) service.
pub const RECOGNIZER_URL: &str = "https://services.zotero.org/recognizer";

/// Timeout for classifier requests in seconds.
pub const RECOGNIZER_TIMEOUT_SECS: u64 = 30;

/// Default base URL of the translation server used for identifier lookup.
pub const TRANSLATION_SERVER_URL: &str = "http://127.0.0.1:1969";

/// Timeout for identifier lookup requests in seconds.
pub const TRANSLATION_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// EXTRACTION ENGINE
// =============================================================================

/// Default `pdftotext` binary.
pub const PDFTOTEXT_BIN: &str = "pdftotext";

/// Default `pdfinfo` binary.
pub const PDFINFO_BIN: &str = "pdfinfo";

/// Leading pages extracted for `recognizer` work.
pub const RECOGNIZER_PAGES: usize = 3;

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// ATTACHMENT FILENAMES
// =============================================================================

/// Maximum length of a generated attachment filename, extension included.
pub const ATTACHMENT_FILENAME_MAX_LEN: usize = 150;

/// Filename used when nothing usable can be derived from an item.
pub const ATTACHMENT_FILENAME_FALLBACK: &str = "Full Text";
