//! # recognizer-jobs
//!
//! Scheduling for PDF metadata recognition.
//!
//! This crate provides:
//! - `WorkerPool`: file-bound extraction workers with per-tier admission
//!   caps, work de-duplication, result caching and an idle pre-warmed engine
//! - `RecognitionPipeline`: bounded-concurrency tasks driven through local
//!   extraction, remote classification, identifier resolution and storage
//! - Progress and results via `tokio::sync::broadcast` channels
//! - A poppler-based extraction engine and local file storage
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use recognizer_jobs::{
//!     PoolConfig, PopplerConfig, PopplerProvider, RecognitionPipeline, Task, WorkerPool,
//! };
//! use recognizer_remote::{RecognizerClient, TranslationServerClient};
//!
//! let pool = WorkerPool::new(
//!     Arc::new(PopplerProvider::new(PopplerConfig::from_env())),
//!     PoolConfig::from_env(),
//! );
//! let pipeline = RecognitionPipeline::builder(
//!     pool,
//!     Arc::new(RecognizerClient::from_env()?),
//!     Arc::new(TranslationServerClient::from_env()?),
//! )
//! .build();
//!
//! let mut updates = pipeline.queue(Task::simple("paper.pdf"));
//! while let Ok(update) = updates.recv().await {
//!     println!("{}", update.kind.event_type());
//!     if update.kind.is_terminal() {
//!         break;
//!     }
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod ordered;
pub mod pipeline;
pub mod pool;
pub mod storage;

// Re-export core types
pub use recognizer_core::*;

pub use adapters::{PopplerConfig, PopplerEngine, PopplerProvider};
pub use config::{PipelineConfig, PoolConfig};
pub use ordered::FifoMap;
pub use pipeline::{PipelineBuilder, RecognitionPipeline};
pub use pool::WorkerPool;
pub use storage::LocalFileStorage;
