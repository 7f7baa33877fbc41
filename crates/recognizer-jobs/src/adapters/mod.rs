//! Extraction engine implementations.

pub mod poppler;

pub use poppler::{PopplerConfig, PopplerEngine, PopplerProvider};
