//! Multi-stage recognition pipeline.
//!
//! A [`Task`] moves through four stages:
//!
//! 1. local recognition on a fresh `default`-tier pool worker
//! 2. remote classification of the extracted data
//! 3. identifier resolution, trying candidates in order until one parses
//! 4. materialization: report the item, or create it as the attachment's
//!    parent and rename the attachment file
//!
//! At most `max_concurrent_tasks` tasks are past `enqueued` at once; the
//! rest wait in FIFO order. Every task ends with exactly one terminal update.
//!
//! Task bookkeeping sits behind one `parking_lot::RwLock`. Each admitted
//! task is driven by a spawned driver that re-checks its token at every
//! stage boundary, so a cancelled task's late results are dropped. A task
//! cancelled during parent creation reports `cancelled` at once, but its
//! driver is not aborted: the storage steps finish (or roll the file back)
//! so the attachment file is never left half-renamed. Lock order is
//! pipeline then pool.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn};

use recognizer_core::{
    attachment_filename, FileStorage, IdentifierLookup, ItemStore, LibraryId, ParsedItem,
    Priority, RecognitionError, RecognizerIdentifier, RecognizerResponse, RemoteClassifier,
    Result, Task, TaskKind, TaskState, TaskUpdate, TaskUpdateKind, Work, WorkUpdateKind, Worker,
};

use crate::config::PipelineConfig;
use crate::ordered::FifoMap;
use crate::pool::WorkerPool;
use crate::storage::LocalFileStorage;

/// Attachment title given to PDF attachments under a new parent.
const PDF_ATTACHMENT_TITLE: &str = "PDF";

/// Attachment title for everything else.
const FULL_TEXT_ATTACHMENT_TITLE: &str = "Full Text";

struct TaskEntry {
    state: TaskState,
    sender: broadcast::Sender<TaskUpdate>,
    /// Pool worker bound during stage 1.
    worker: Option<Worker>,
    driver: Option<AbortHandle>,
    token: u64,
    /// Stage 4 has started; the driver runs to completion even if cancelled.
    materializing: bool,
}

#[derive(Default)]
struct PipelineState {
    queue: FifoMap<Task, ()>,
    tasks: HashMap<Task, TaskEntry>,
    /// Last update per `(library, attachment key)` for create-parent tasks.
    latest: HashMap<(LibraryId, String), TaskUpdateKind>,
    next_token: u64,
}

impl PipelineState {
    fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| t.state.is_active()).count()
    }

    /// Entry for `task` if it is still the run identified by `token`.
    fn live_mut(&mut self, task: &Task, token: u64) -> Option<&mut TaskEntry> {
        self.tasks.get_mut(task).filter(|entry| entry.token == token)
    }
}

struct PipelineInner {
    config: PipelineConfig,
    pool: WorkerPool,
    classifier: Arc<dyn RemoteClassifier>,
    lookup: Arc<dyn IdentifierLookup>,
    item_store: Option<Arc<dyn ItemStore>>,
    file_storage: Arc<dyn FileStorage>,
    state: RwLock<PipelineState>,
    events: broadcast::Sender<TaskUpdate>,
}

/// Drives recognition tasks from a PDF to a parsed (and optionally stored) item.
///
/// Cheap to clone; clones share the same pipeline.
#[derive(Clone)]
pub struct RecognitionPipeline {
    inner: Arc<PipelineInner>,
}

/// Outcome of stage 1.
enum Extraction {
    Data(JsonValue),
    Finished(TaskUpdateKind),
}

impl RecognitionPipeline {
    pub fn builder(
        pool: WorkerPool,
        classifier: Arc<dyn RemoteClassifier>,
        lookup: Arc<dyn IdentifierLookup>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(pool, classifier, lookup)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Receiver of every task's updates.
    pub fn events(&self) -> broadcast::Receiver<TaskUpdate> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Queue `task` and subscribe to its updates.
    ///
    /// Queuing a task that is already known subscribes to the existing run.
    #[instrument(skip_all, fields(subsystem = "pipeline", task_file = %task.file.display()))]
    pub fn queue(&self, task: Task) -> broadcast::Receiver<TaskUpdate> {
        let mut state = self.inner.state.write();

        if let Some(entry) = state.tasks.get(&task) {
            debug!(state = entry.state.as_str(), "Task already queued, subscribing");
            return entry.sender.subscribe();
        }

        let token = {
            state.next_token += 1;
            state.next_token
        };
        let (sender, rx) = broadcast::channel(self.inner.config.event_capacity);
        state.tasks.insert(
            task.clone(),
            TaskEntry {
                state: TaskState::Enqueued,
                sender,
                worker: None,
                driver: None,
                token,
                materializing: false,
            },
        );
        state.queue.insert(task.clone(), ());

        self.emit(&mut state, &task, TaskUpdateKind::Enqueued);
        debug!(queued = state.queue.len(), "Task enqueued");

        self.start_tasks_if_needed(&mut state);
        rx
    }

    /// Cancel `task` in whatever stage it is. Returns `false` if unknown.
    #[instrument(skip_all, fields(subsystem = "pipeline", task_file = %task.file.display()))]
    pub fn cancel(&self, task: &Task) -> bool {
        let mut state = self.inner.state.write();
        if !self.cancel_locked(&mut state, task) {
            return false;
        }
        self.start_tasks_if_needed(&mut state);
        true
    }

    /// Cancel every queued and running task.
    #[instrument(skip_all, fields(subsystem = "pipeline"))]
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.write();
        let tasks: Vec<Task> = state.tasks.keys().cloned().collect();
        for task in &tasks {
            self.cancel_locked(&mut state, task);
        }
        info!(count = tasks.len(), "Cancelled all tasks");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Last update of the create-parent task for attachment `key`.
    pub fn latest_update(&self, key: &str, library_id: LibraryId) -> Option<TaskUpdateKind> {
        self.inner
            .state
            .read()
            .latest
            .get(&(library_id, key.to_string()))
            .cloned()
    }

    pub fn task_state(&self, task: &Task) -> Option<TaskState> {
        self.inner
            .state
            .read()
            .tasks
            .get(task)
            .map(|entry| entry.state.clone())
    }

    /// Tasks past the `enqueued` stage.
    pub fn active_count(&self) -> usize {
        self.inner.state.read().active_count()
    }

    /// Tasks waiting for admission.
    pub fn enqueued_count(&self) -> usize {
        self.inner.state.read().queue.len()
    }

    // =========================================================================
    // Bookkeeping (write lock held)
    // =========================================================================

    /// Send an update to the task's subscribers and the aggregate stream.
    fn emit(&self, state: &mut PipelineState, task: &Task, kind: TaskUpdateKind) {
        if let Some((library_id, key)) = task.parent_target() {
            state
                .latest
                .insert((library_id, key.to_string()), kind.clone());
        }
        let update = TaskUpdate::new(task.clone(), kind);
        if let Some(entry) = state.tasks.get(task) {
            let _ = entry.sender.send(update.clone());
        }
        let _ = self.inner.events.send(update);
    }

    fn start_tasks_if_needed(&self, state: &mut PipelineState) {
        while state.active_count() < self.inner.config.max_concurrent_tasks {
            let Some((task, ())) = state.queue.pop_front() else {
                break;
            };
            let Some(entry) = state.tasks.get_mut(&task) else {
                continue;
            };
            entry.state = TaskState::RecognitionInProgress;
            let token = entry.token;

            let pipeline = self.clone();
            let driven = task.clone();
            let handle = tokio::spawn(async move {
                pipeline.drive(driven, token).await;
            });
            entry.driver = Some(handle.abort_handle());

            debug!(task_file = %task.file.display(), "Task admitted");
            self.emit(state, &task, TaskUpdateKind::InProgress);
        }
    }

    fn cancel_locked(&self, state: &mut PipelineState, task: &Task) -> bool {
        let Some(mut entry) = state.tasks.remove(task) else {
            return false;
        };
        state.queue.remove(task);

        if entry.materializing {
            debug!(
                subsystem = "pipeline",
                task_file = %task.file.display(),
                "Parent creation in flight, letting it settle"
            );
        } else if let Some(driver) = entry.driver.take() {
            driver.abort();
        }
        if let Some(worker) = entry.worker.take() {
            self.inner.pool.cleanup_worker(&worker);
        }

        info!(
            subsystem = "pipeline",
            task_file = %task.file.display(),
            stage = entry.state.as_str(),
            "Task cancelled"
        );
        let update = TaskUpdate::new(task.clone(), TaskUpdateKind::Cancelled);
        let _ = entry.sender.send(update.clone());
        let _ = self.inner.events.send(update);
        if let Some((library_id, key)) = task.parent_target() {
            state
                .latest
                .insert((library_id, key.to_string()), TaskUpdateKind::Cancelled);
        }
        true
    }

    /// Move a live task to `next`. Returns `false` if it was cancelled.
    fn transition(&self, task: &Task, token: u64, next: TaskState) -> bool {
        let mut state = self.inner.state.write();
        match state.live_mut(task, token) {
            Some(entry) => {
                debug!(
                    subsystem = "pipeline",
                    task_file = %task.file.display(),
                    state = next.as_str(),
                    "Task stage changed"
                );
                entry.state = next;
                true
            }
            None => false,
        }
    }

    /// Enter stage 4. Returns `false` if the task was cancelled.
    fn begin_materializing(&self, task: &Task, token: u64) -> bool {
        let mut state = self.inner.state.write();
        match state.live_mut(task, token) {
            Some(entry) => {
                entry.materializing = true;
                true
            }
            None => false,
        }
    }

    /// Emit the terminal update, forget the task and admit the next one.
    fn finish(&self, task: &Task, token: u64, kind: TaskUpdateKind) {
        let mut state = self.inner.state.write();
        if state.live_mut(task, token).is_none() {
            debug!(
                subsystem = "pipeline",
                task_file = %task.file.display(),
                "Dropping result of a finished task"
            );
            return;
        }

        self.emit(&mut state, task, kind.clone());
        if let Some(mut entry) = state.tasks.remove(task) {
            if let Some(worker) = entry.worker.take() {
                self.inner.pool.cleanup_worker(&worker);
            }
        }

        match &kind {
            TaskUpdateKind::Failed(reason) => info!(
                subsystem = "pipeline",
                task_file = %task.file.display(),
                error = %reason,
                "Recognition failed"
            ),
            other => info!(
                subsystem = "pipeline",
                task_file = %task.file.display(),
                outcome = other.event_type(),
                "Recognition finished"
            ),
        }

        self.start_tasks_if_needed(&mut state);
    }

    /// Drop the stage-1 worker from the task and the pool.
    fn release_worker(&self, task: &Task, token: u64) {
        let mut state = self.inner.state.write();
        let worker = state
            .live_mut(task, token)
            .and_then(|entry| entry.worker.take());
        if let Some(worker) = worker {
            self.inner.pool.cleanup_worker(&worker);
        }
    }

    // =========================================================================
    // Stages (driver task)
    // =========================================================================

    async fn drive(self, task: Task, token: u64) {
        let start = Instant::now();
        let kind = self.run_stages(&task, token).await;
        if let Some(kind) = kind {
            debug!(
                task_file = %task.file.display(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Task stages complete"
            );
            self.finish(&task, token, kind);
        }
    }

    /// Run every stage. `None` means the task was cancelled along the way.
    async fn run_stages(&self, task: &Task, token: u64) -> Option<TaskUpdateKind> {
        // Stage 1: local recognition.
        let data = match self.recognize_locally(task, token).await? {
            Extraction::Data(data) => data,
            Extraction::Finished(kind) => return Some(kind),
        };

        // Stage 2: remote classification.
        if !self.transition(
            task,
            token,
            TaskState::RemoteRecognitionInProgress { data: data.clone() },
        ) {
            return None;
        }
        let response = match self.inner.classifier.classify(&data).await {
            Ok(response) => response,
            Err(e) => {
                return Some(TaskUpdateKind::Failed(
                    RecognitionError::RemoteClassificationFailure(e.to_string()),
                ))
            }
        };
        let identifiers = response.identifiers();
        if identifiers.is_empty() {
            return Some(TaskUpdateKind::Failed(
                RecognitionError::NoCandidateIdentifiers,
            ));
        }

        // Stage 3: identifier resolution.
        let item = match self.resolve(task, token, response, identifiers).await? {
            Some(item) => item,
            None => {
                return Some(TaskUpdateKind::Failed(
                    RecognitionError::IdentifiersExhausted,
                ))
            }
        };

        // Stage 4: materialization.
        match &task.kind {
            TaskKind::Simple => Some(TaskUpdateKind::Translated(item)),
            TaskKind::CreateParentForItem { library_id, key } => {
                if !self.begin_materializing(task, token) {
                    return None;
                }
                match self.create_parent(task, *library_id, key, &item).await {
                    Ok(()) => Some(TaskUpdateKind::CreatedParent(item)),
                    Err(e) => {
                        error!(
                            subsystem = "pipeline",
                            library_id = %library_id,
                            item_key = %key,
                            error = %e,
                            "Parent creation failed"
                        );
                        Some(TaskUpdateKind::Failed(
                            RecognitionError::ParentCreationFailure(e.to_string()),
                        ))
                    }
                }
            }
        }
    }

    /// Stage 1. The worker is released as soon as the work settles.
    async fn recognize_locally(&self, task: &Task, token: u64) -> Option<Extraction> {
        let worker = Worker::new(task.file.clone(), Priority::Default);
        let mut rx = {
            let mut state = self.inner.state.write();
            let entry = state.live_mut(task, token)?;
            entry.worker = Some(worker.clone());
            self.inner.pool.queue(Work::Recognizer, &worker)
        };

        let outcome = loop {
            match rx.recv().await {
                Ok(update) => match update.kind {
                    WorkUpdateKind::InProgress => continue,
                    WorkUpdateKind::ExtractedData(data) => break Extraction::Data(data),
                    WorkUpdateKind::Failed(reason) => {
                        break Extraction::Finished(TaskUpdateKind::Failed(reason))
                    }
                    WorkUpdateKind::Cancelled => {
                        break Extraction::Finished(TaskUpdateKind::Cancelled)
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Recognition work updates lagged");
                }
                Err(RecvError::Closed) => {
                    break Extraction::Finished(TaskUpdateKind::Failed(
                        RecognitionError::UnexpectedState(
                            "worker update stream closed without a result".into(),
                        ),
                    ))
                }
            }
        };

        self.release_worker(task, token);
        Some(outcome)
    }

    /// Stage 3. `Some(None)` when every candidate failed, `None` if cancelled.
    async fn resolve(
        &self,
        task: &Task,
        token: u64,
        response: RecognizerResponse,
        identifiers: Vec<RecognizerIdentifier>,
    ) -> Option<Option<ParsedItem>> {
        let mut pending = identifiers.into_iter();

        while let Some(current) = pending.next() {
            let next = TaskState::IdentifiersLookupInProgress {
                response: response.clone(),
                current: current.clone(),
                pending: pending.as_slice().to_vec(),
            };
            if !self.transition(task, token, next) {
                return None;
            }

            match self.lookup_item(&current, &response).await {
                Ok(item) => {
                    debug!(identifier = %current, "Identifier resolved");
                    return Some(Some(item));
                }
                Err(reason) => {
                    warn!(
                        subsystem = "pipeline",
                        task_file = %task.file.display(),
                        identifier = %current,
                        error = %reason,
                        "Candidate identifier failed, trying next"
                    );
                }
            }
        }

        Some(None)
    }

    /// Resolve one candidate into an item.
    async fn lookup_item(
        &self,
        identifier: &RecognizerIdentifier,
        response: &RecognizerResponse,
    ) -> std::result::Result<ParsedItem, RecognitionError> {
        if identifier.is_title() {
            return ParsedItem::from_recognizer_response(response);
        }

        let json = self
            .inner
            .lookup
            .lookup(identifier)
            .await
            .map_err(|e| RecognitionError::LookupFailure(e.to_string()))?;
        let mut item = ParsedItem::from_translator_json(&json, identifier.automatic_tags())?;
        item.enrich_from(response);
        Ok(item)
    }

    /// Stage 4 for create-parent tasks.
    ///
    /// The record transaction commits first. The file is then moved to its
    /// new name, and moved back if recording the new name fails.
    async fn create_parent(
        &self,
        task: &Task,
        library_id: LibraryId,
        key: &str,
        item: &ParsedItem,
    ) -> Result<()> {
        let store = self.inner.item_store.as_ref().ok_or_else(|| {
            recognizer_core::Error::Config("No item store configured".to_string())
        })?;

        let extension = task.file.extension().and_then(OsStr::to_str);
        let attachment_title = if extension.is_some_and(|ext| ext.eq_ignore_ascii_case("pdf")) {
            PDF_ATTACHMENT_TITLE
        } else {
            FULL_TEXT_ATTACHMENT_TITLE
        };

        let created = store
            .create_parent(library_id, key, item, attachment_title)
            .await?;
        debug!(
            library_id = %library_id,
            item_key = %key,
            parent_key = %created.parent_key,
            "Parent item created"
        );

        let old_path = created.attachment_file.unwrap_or_else(|| task.file.clone());
        if !self.inner.file_storage.exists(&old_path).await {
            return Ok(());
        }

        let filename = attachment_filename(
            item,
            old_path.extension().and_then(OsStr::to_str),
        );
        let new_path = old_path.with_file_name(&filename);
        if new_path == old_path {
            return Ok(());
        }

        self.inner.file_storage.move_file(&old_path, &new_path).await?;
        if let Err(e) = store
            .rename_attachment_file(library_id, key, &filename)
            .await
        {
            self.restore_file(&new_path, &old_path).await;
            return Err(e);
        }

        info!(
            library_id = %library_id,
            item_key = %key,
            filename = %filename,
            "Attachment file renamed"
        );
        Ok(())
    }

    async fn restore_file(&self, moved: &Path, original: &Path) {
        if let Err(e) = self.inner.file_storage.move_file(moved, original).await {
            error!(
                from = %moved.display(),
                to = %original.display(),
                error = %e,
                "Could not restore attachment file"
            );
        }
    }
}

/// Builder for a [`RecognitionPipeline`].
pub struct PipelineBuilder {
    pool: WorkerPool,
    classifier: Arc<dyn RemoteClassifier>,
    lookup: Arc<dyn IdentifierLookup>,
    item_store: Option<Arc<dyn ItemStore>>,
    file_storage: Option<Arc<dyn FileStorage>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new(
        pool: WorkerPool,
        classifier: Arc<dyn RemoteClassifier>,
        lookup: Arc<dyn IdentifierLookup>,
    ) -> Self {
        Self {
            pool,
            classifier,
            lookup,
            item_store: None,
            file_storage: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Item store for create-parent tasks. Without one they fail.
    pub fn with_item_store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.item_store = Some(store);
        self
    }

    /// File storage for attachment renames. Defaults to the local filesystem.
    pub fn with_file_storage(mut self, storage: Arc<dyn FileStorage>) -> Self {
        self.file_storage = Some(storage);
        self
    }

    pub fn build(self) -> RecognitionPipeline {
        let (events, _) = broadcast::channel(self.config.event_capacity);
        info!(
            subsystem = "pipeline",
            max_concurrent = self.config.max_concurrent_tasks,
            has_item_store = self.item_store.is_some(),
            "Recognition pipeline created"
        );
        RecognitionPipeline {
            inner: Arc::new(PipelineInner {
                config: self.config,
                pool: self.pool,
                classifier: self.classifier,
                lookup: self.lookup,
                item_store: self.item_store,
                file_storage: self
                    .file_storage
                    .unwrap_or_else(|| Arc::new(LocalFileStorage::new())),
                state: RwLock::new(PipelineState::default()),
                events,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use async_trait::async_trait;
    use recognizer_core::{Engine, EngineProvider};
    use recognizer_remote::mock::{MockClassifier, MockLookup};

    struct StaticEngine;

    #[async_trait]
    impl Engine for StaticEngine {
        async fn run_recognizer(&self, _file: &Path) -> Result<JsonValue> {
            Ok(serde_json::json!({ "pages": [] }))
        }

        async fn run_full_text(&self, _file: &Path, _pages: Option<&[u32]>) -> Result<JsonValue> {
            Ok(serde_json::json!({ "text": "" }))
        }
    }

    struct StaticProvider;

    #[async_trait]
    impl EngineProvider for StaticProvider {
        async fn start(&self) -> Result<Arc<dyn Engine>> {
            Ok(Arc::new(StaticEngine))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn pipeline(response: RecognizerResponse, lookup: MockLookup) -> RecognitionPipeline {
        let pool = WorkerPool::new(
            Arc::new(StaticProvider),
            PoolConfig::default().with_prewarm(false),
        );
        RecognitionPipeline::builder(
            pool,
            Arc::new(MockClassifier::new(response)),
            Arc::new(lookup),
        )
        .build()
    }

    async fn terminal(rx: &mut broadcast::Receiver<TaskUpdate>) -> TaskUpdateKind {
        loop {
            let update = rx.recv().await.unwrap();
            if update.kind.is_terminal() {
                return update.kind;
            }
        }
    }

    #[tokio::test]
    async fn test_title_synthesis_without_lookup() {
        let lookup = MockLookup::new();
        let pipeline = pipeline(
            RecognizerResponse {
                title: Some("A Study".into()),
                year: Some("2020".into()),
                ..Default::default()
            },
            lookup.clone(),
        );

        let mut rx = pipeline.queue(Task::simple("/tmp/a.pdf"));
        match terminal(&mut rx).await {
            TaskUpdateKind::Translated(item) => {
                assert_eq!(item.title, "A Study");
                assert_eq!(item.item_type, "journalArticle");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lookup.call_count(), 0);
        assert_eq!(pipeline.active_count(), 0);
    }

    #[tokio::test]
    async fn test_create_parent_without_store_fails() {
        let pipeline = pipeline(
            RecognizerResponse {
                title: Some("A Study".into()),
                ..Default::default()
            },
            MockLookup::new(),
        );

        let task = Task::create_parent("/tmp/a.pdf", LibraryId::User(1), "ABCD2345");
        let mut rx = pipeline.queue(task);
        let kind = terminal(&mut rx).await;
        assert!(matches!(
            kind,
            TaskUpdateKind::Failed(RecognitionError::ParentCreationFailure(_))
        ));
        assert_eq!(
            pipeline.latest_update("ABCD2345", LibraryId::User(1)),
            Some(kind)
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let pipeline = pipeline(RecognizerResponse::default(), MockLookup::new());
        assert!(!pipeline.cancel(&Task::simple("/tmp/none.pdf")));
    }
}
