//! Shared fakes for worker pool and pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, Semaphore};

use recognizer_jobs::{
    CreatedParent, Engine, EngineProvider, Error, ItemStore, LibraryId, ParsedItem, PoolConfig,
    Result, WorkerPool,
};

// ============================================================================
// ENGINE
// ============================================================================

/// Decrements the running counter even when the engine call is aborted.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine that records calls and, when gated, blocks each call until a
/// permit is released.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    /// Files passed to the engine, in call order.
    pub files: Mutex<Vec<PathBuf>>,
    gate: Option<Arc<Semaphore>>,
    failing_files: Mutex<HashSet<PathBuf>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `n` blocked calls finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running_now(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn seen_files(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().clone()
    }

    pub fn fail_on(&self, file: impl Into<PathBuf>) {
        self.failing_files.lock().unwrap().insert(file.into());
    }

    async fn call(&self, file: &Path, payload: JsonValue) -> Result<JsonValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push(file.to_path_buf());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing_files.lock().unwrap().contains(file) {
            return Err(Error::Engine(format!("cannot read {}", file.display())));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn run_recognizer(&self, file: &Path) -> Result<JsonValue> {
        self.call(
            file,
            json!({
                "totalPages": 1,
                "pages": [{ "index": 0, "text": format!("contents of {}", file.display()) }]
            }),
        )
        .await
    }

    async fn run_full_text(&self, file: &Path, pages: Option<&[u32]>) -> Result<JsonValue> {
        self.call(file, json!({ "pages": pages, "text": "full text" }))
            .await
    }
}

/// Provider handing out one shared [`FakeEngine`].
pub struct FakeProvider {
    pub engine: Arc<FakeEngine>,
    pub starts: AtomicUsize,
    pub fail_start: AtomicBool,
}

impl FakeProvider {
    pub fn new(engine: FakeEngine) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(engine),
            starts: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
        })
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineProvider for FakeProvider {
    async fn start(&self) -> Result<Arc<dyn Engine>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Engine("engine binary missing".into()));
        }
        Ok(self.engine.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn pool_with(provider: Arc<FakeProvider>, config: PoolConfig) -> WorkerPool {
    WorkerPool::new(provider, config)
}

/// Pool without pre-warming so engine start counts are exact.
pub fn cold_pool(provider: Arc<FakeProvider>) -> WorkerPool {
    WorkerPool::new(provider, PoolConfig::default().with_prewarm(false))
}

// ============================================================================
// ITEM STORE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub library_id: LibraryId,
    pub attachment_key: String,
    pub title: String,
    pub attachment_title: String,
}

/// In-memory item store with switchable failures.
#[derive(Default)]
pub struct FakeItemStore {
    pub fail_create: bool,
    pub fail_rename: bool,
    pub attachment_file: Option<PathBuf>,
    pub created: Mutex<Vec<CreatedRecord>>,
    pub renamed: Mutex<Vec<String>>,
    /// When set, each rename waits for a permit.
    pub rename_gate: Option<Arc<Semaphore>>,
    pub renames_started: AtomicUsize,
}

impl FakeItemStore {
    /// Store whose renames block until [`FakeItemStore::release_renames`].
    pub fn gated() -> Self {
        Self {
            rename_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn release_renames(&self, n: usize) {
        if let Some(gate) = &self.rename_gate {
            gate.add_permits(n);
        }
    }

    pub fn renames_started(&self) -> usize {
        self.renames_started.load(Ordering::SeqCst)
    }

    pub fn with_attachment_file(file: impl Into<PathBuf>) -> Self {
        Self {
            attachment_file: Some(file.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ItemStore for FakeItemStore {
    async fn create_parent(
        &self,
        library_id: LibraryId,
        attachment_key: &str,
        item: &ParsedItem,
        attachment_title: &str,
    ) -> Result<CreatedParent> {
        if self.fail_create {
            return Err(Error::Storage("transaction aborted".into()));
        }
        self.created.lock().unwrap().push(CreatedRecord {
            library_id,
            attachment_key: attachment_key.to_string(),
            title: item.title.clone(),
            attachment_title: attachment_title.to_string(),
        });
        Ok(CreatedParent {
            parent_key: "PARENT01".to_string(),
            attachment_file: self.attachment_file.clone(),
        })
    }

    async fn rename_attachment_file(
        &self,
        _library_id: LibraryId,
        _attachment_key: &str,
        filename: &str,
    ) -> Result<()> {
        self.renames_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.rename_gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail_rename {
            return Err(Error::Storage("attachment record is locked".into()));
        }
        self.renamed.lock().unwrap().push(filename.to_string());
        Ok(())
    }
}

// ============================================================================
// WAITING
// ============================================================================

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Collect updates up to and including the first terminal one.
pub async fn collect_until<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    is_terminal: impl Fn(&T) -> bool,
) -> Vec<T> {
    let mut updates = Vec::new();
    loop {
        let update = with_timeout(rx.recv()).await.expect("update stream closed");
        let done = is_terminal(&update);
        updates.push(update);
        if done {
            return updates;
        }
    }
}

pub async fn with_timeout<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
