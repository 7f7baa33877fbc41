//! # recognizer-remote
//!
//! HTTP clients for the remote services used during recognition.
//!
//! ## Features
//!
//! - **Classification**: `RecognizerClient` posts extracted document data to
//!   the recognizer service and parses the metadata it returns
//! - **Identifier lookup**: `TranslationServerClient` resolves DOI, ISBN,
//!   and arXiv identifiers into translator item JSON
//! - **Mocks**: `mock` module (behind the `mock` feature) for deterministic tests
//!
//! ## Example
//!
//! ```ignore
//! use recognizer_remote::{RecognizerClient, TranslationServerClient};
//!
//! let classifier = RecognizerClient::from_env()?;
//! let lookup = TranslationServerClient::from_env()?;
//! ```

pub mod classifier;
pub mod lookup;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use classifier::{ClassifierConfig, RecognizerClient};
pub use lookup::{LookupConfig, TranslationServerClient};
