//! # recognizer-core
//!
//! Core types, traits, and events for PDF metadata recognition.
//!
//! This crate provides the value types shared by the worker pool and the
//! recognition pipeline, the event payloads both emit, the error taxonomy,
//! and the collaborator traits (engine, remote services, storage) the other
//! recognizer crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod filename;
pub mod identifiers;
pub mod item;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, RecognitionError, Result};
pub use events::{TaskUpdate, TaskUpdateKind, WorkUpdate, WorkUpdateKind};
pub use filename::{attachment_filename, sanitize_filename};
pub use identifiers::{RecognizerAuthor, RecognizerIdentifier, RecognizerResponse};
pub use item::{Creator, ItemTag, ParsedItem};
pub use models::*;
pub use traits::*;
