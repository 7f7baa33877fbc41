//! Worker pool multiplexing extraction engines across workers.
//!
//! Each [`Worker`] is bound to one file and holds at most one live engine.
//! Work queued on a worker is admitted per priority tier, high first, with
//! a running-worker cap per tier. While the pool has nothing to do it keeps
//! one idle engine warm so the next worker can skip engine start-up.
//!
//! All state lives behind one `parking_lot::RwLock`. Transitions take the
//! write lock and never await; engine calls run on spawned tasks that take
//! the lock again to report back. Each spawned call carries a token, so a
//! completion that arrives after its worker or work was cancelled is
//! recognised as stale and discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, trace, warn};

use recognizer_core::{
    Engine, EngineProvider, Error, Priority, RecognitionError, Result, Work, WorkUpdate,
    WorkUpdateKind, Worker, WorkerId, WorkerState,
};

use crate::config::PoolConfig;
use crate::ordered::FifoMap;

/// Work currently executing on a worker's engine.
struct RunningWork {
    work: Work,
    token: u64,
    abort: AbortHandle,
}

/// Engine start-up in flight for a worker.
struct Preparation {
    token: u64,
    abort: AbortHandle,
}

/// Pool-side state of one worker.
struct WorkerSlot {
    worker: Worker,
    state: WorkerState,
    /// Pending work in request order; the head is the next to run.
    works: FifoMap<Work, broadcast::Sender<WorkUpdate>>,
    engine: Option<Arc<dyn Engine>>,
    running: Option<RunningWork>,
    preparing: Option<Preparation>,
    /// Completed payloads, kept only when `worker.cache_data` is set.
    cache: HashMap<Work, JsonValue>,
}

impl WorkerSlot {
    fn new(worker: Worker) -> Self {
        Self {
            worker,
            state: WorkerState::Pending,
            works: FifoMap::new(),
            engine: None,
            running: None,
            preparing: None,
            cache: HashMap::new(),
        }
    }

    /// Stop in-flight engine calls and drop the engine.
    fn halt(&mut self) {
        if let Some(running) = self.running.take() {
            running.abort.abort();
        }
        if let Some(preparation) = self.preparing.take() {
            preparation.abort.abort();
        }
        self.engine = None;
    }
}

#[derive(Default)]
struct TierQueues {
    /// Workers with unstarted work, waiting on admission.
    queued: FifoMap<WorkerId, ()>,
    running: FifoMap<WorkerId, ()>,
}

#[derive(Default)]
struct PoolState {
    workers: HashMap<WorkerId, WorkerSlot>,
    default_tier: TierQueues,
    high_tier: TierQueues,
    idle_engine: Option<Arc<dyn Engine>>,
    /// Token of the pre-warm start-up in flight, if any.
    warming: Option<u64>,
    next_token: u64,
}

impl PoolState {
    fn tier(&self, tier: Priority) -> &TierQueues {
        match tier {
            Priority::Default => &self.default_tier,
            Priority::High => &self.high_tier,
        }
    }

    fn tier_mut(&mut self, tier: Priority) -> &mut TierQueues {
        match tier {
            Priority::Default => &mut self.default_tier,
            Priority::High => &mut self.high_tier,
        }
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Move a worker to `queued` at the back of its tier.
    fn enqueue_worker(&mut self, id: WorkerId) {
        let Some(slot) = self.workers.get_mut(&id) else {
            return;
        };
        slot.state = WorkerState::Queued;
        let tier = slot.worker.priority;
        self.tier_mut(tier).queued.insert(id, ());
    }

    /// Take a worker out of both admission sets of its tier.
    fn unlist_worker(&mut self, id: WorkerId, tier: Priority) {
        let queues = self.tier_mut(tier);
        queues.queued.remove(&id);
        queues.running.remove(&id);
    }

    /// `ready` when no work remains, `queued` otherwise.
    fn settle_worker(&mut self, id: WorkerId) {
        let Some(slot) = self.workers.get_mut(&id) else {
            return;
        };
        if slot.works.is_empty() {
            slot.state = if slot.engine.is_some() {
                WorkerState::Ready
            } else {
                WorkerState::Pending
            };
        } else {
            self.enqueue_worker(id);
        }
    }

    /// No worker is preparing, ready, queued, running or failed.
    fn is_idle(&self) -> bool {
        self.workers
            .values()
            .all(|slot| slot.state == WorkerState::Pending)
    }
}

struct PoolInner {
    config: PoolConfig,
    provider: Arc<dyn EngineProvider>,
    state: RwLock<PoolState>,
}

/// Bounded pool of file-bound extraction workers.
///
/// Cheap to clone; clones share the same pool. Every method that changes
/// state spawns engine calls and must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(provider: Arc<dyn EngineProvider>, config: PoolConfig) -> Self {
        info!(
            subsystem = "pool",
            engine = provider.name(),
            default_tier_max = config.default_tier_max,
            high_tier_max = config.high_tier_max,
            prewarm = config.prewarm,
            "Worker pool created"
        );
        let pool = Self {
            inner: Arc::new(PoolInner {
                config,
                provider,
                state: RwLock::new(PoolState::default()),
            }),
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            let mut state = pool.inner.state.write();
            pool.maybe_prewarm(&mut state);
        }
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Queue `work` on `worker` and subscribe to its updates.
    ///
    /// Queuing work that is already pending on the same worker subscribes
    /// to the existing execution instead of starting another one. On a
    /// worker with `cache_data` set, work that already completed is
    /// answered from the cache with a single `ExtractedData` update.
    #[instrument(skip_all, fields(subsystem = "pool", worker_id = %worker.id, work = %work))]
    pub fn queue(&self, work: Work, worker: &Worker) -> broadcast::Receiver<WorkUpdate> {
        let mut state = self.inner.state.write();
        let id = worker.id;

        let slot = state
            .workers
            .entry(id)
            .or_insert_with(|| WorkerSlot::new(worker.clone()));

        if let Some(sender) = slot.works.get(&work) {
            debug!("Work already pending, sharing its execution");
            return sender.subscribe();
        }

        if slot.worker.cache_data {
            if let Some(data) = slot.cache.get(&work) {
                debug!("Answering work from cache");
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(WorkUpdate::new(
                    id,
                    work,
                    WorkUpdateKind::ExtractedData(data.clone()),
                ));
                return rx;
            }
        }

        let (tx, rx) = broadcast::channel(self.inner.config.event_capacity);
        slot.works.insert(work, tx);

        let current = slot.state;
        match current {
            WorkerState::Pending | WorkerState::Failed => self.prepare_worker(&mut state, id),
            WorkerState::Ready => state.enqueue_worker(id),
            // Preparing workers enqueue once their engine is up; running
            // workers re-enqueue when the current work completes.
            WorkerState::Preparing | WorkerState::Queued | WorkerState::Running => {}
        }

        self.start_work_if_needed(&mut state);
        rx
    }

    /// Cancel one piece of work, leaving the worker's other work alone.
    #[instrument(skip_all, fields(subsystem = "pool", worker_id = %worker.id, work = %work))]
    pub fn cancel_work(&self, work: &Work, worker: &Worker) {
        let mut state = self.inner.state.write();
        let id = worker.id;

        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        let Some(sender) = slot.works.remove(work) else {
            return;
        };
        let tier = slot.worker.priority;

        let was_running = slot.running.as_ref().is_some_and(|r| &r.work == work);
        if was_running {
            if let Some(running) = slot.running.take() {
                running.abort.abort();
            }
            state.unlist_worker(id, tier);
            state.settle_worker(id);
        } else if slot.works.is_empty() && slot.state == WorkerState::Queued {
            state.unlist_worker(id, tier);
            state.settle_worker(id);
        }

        debug!("Work cancelled");
        let _ = sender.send(WorkUpdate::new(id, work.clone(), WorkUpdateKind::Cancelled));

        self.start_work_if_needed(&mut state);
        self.maybe_prewarm(&mut state);
    }

    /// Cancel everything pending on `worker`, release its engine and reset it
    /// to `pending`.
    #[instrument(skip_all, fields(subsystem = "pool", worker_id = %worker.id))]
    pub fn cancel_all_work(&self, worker: &Worker) {
        let mut state = self.inner.state.write();
        self.reset_worker(&mut state, worker.id);
        self.start_work_if_needed(&mut state);
        self.maybe_prewarm(&mut state);
    }

    /// Cancel everything on `worker` and forget it, cached results included.
    #[instrument(skip_all, fields(subsystem = "pool", worker_id = %worker.id))]
    pub fn cleanup_worker(&self, worker: &Worker) {
        let mut state = self.inner.state.write();
        self.reset_worker(&mut state, worker.id);
        if state.workers.remove(&worker.id).is_some() {
            debug!("Worker removed");
        }
        self.start_work_if_needed(&mut state);
        self.maybe_prewarm(&mut state);
    }

    /// Cancel and forget every worker.
    #[instrument(skip(self), fields(subsystem = "pool"))]
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.write();
        let ids: Vec<WorkerId> = state.workers.keys().copied().collect();
        for id in &ids {
            self.reset_worker(&mut state, *id);
            state.workers.remove(id);
        }
        info!(workers = ids.len(), "Cancelled all workers");
        self.maybe_prewarm(&mut state);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn worker_state(&self, worker: &Worker) -> Option<WorkerState> {
        self.inner
            .state
            .read()
            .workers
            .get(&worker.id)
            .map(|slot| slot.state)
    }

    /// Workers of `tier` currently executing work.
    pub fn running_count(&self, tier: Priority) -> usize {
        self.inner.state.read().tier(tier).running.len()
    }

    /// Workers of `tier` waiting on admission.
    pub fn queued_count(&self, tier: Priority) -> usize {
        self.inner.state.read().tier(tier).queued.len()
    }

    /// Workers known to the pool.
    pub fn worker_count(&self) -> usize {
        self.inner.state.read().workers.len()
    }

    /// Whether a pre-warmed engine is waiting to be adopted.
    pub fn has_idle_engine(&self) -> bool {
        self.inner.state.read().idle_engine.is_some()
    }

    // =========================================================================
    // Transitions (write lock held)
    // =========================================================================

    /// Give a `pending`/`failed` worker an engine, adopting the idle one when
    /// available and starting a fresh one otherwise.
    fn prepare_worker(&self, state: &mut PoolState, id: WorkerId) {
        if let Some(engine) = state.idle_engine.take() {
            if let Some(slot) = state.workers.get_mut(&id) {
                slot.engine = Some(engine);
                debug!(worker_id = %id, "Adopted pre-warmed engine");
            }
            state.enqueue_worker(id);
            return;
        }

        let token = state.token();
        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        slot.state = WorkerState::Preparing;

        let pool = self.clone();
        let provider = self.inner.provider.clone();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let result = provider.start().await;
            trace!(
                worker_id = %id,
                duration_ms = start.elapsed().as_millis() as u64,
                "Engine start-up finished"
            );
            pool.on_engine_started(id, token, result);
        });
        slot.preparing = Some(Preparation {
            token,
            abort: handle.abort_handle(),
        });
        debug!(worker_id = %id, state = "preparing", "Starting engine for worker");
    }

    /// Admit queued workers, highest tier first, until every tier is at its
    /// cap or has nothing queued.
    fn start_work_if_needed(&self, state: &mut PoolState) {
        loop {
            let next = Priority::DESCENDING.into_iter().find_map(|tier| {
                let queues = state.tier(tier);
                let has_capacity = queues.running.len() < self.inner.config.max_running(tier);
                queues
                    .queued
                    .front()
                    .filter(|_| has_capacity)
                    .map(|(id, _)| (*id, tier))
            });
            let Some((id, tier)) = next else {
                break;
            };
            state.tier_mut(tier).queued.remove(&id);
            self.start_head_work(state, id, tier);
        }
    }

    fn start_head_work(&self, state: &mut PoolState, id: WorkerId, tier: Priority) {
        let token = state.token();
        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        let Some((work, sender)) = slot.works.front().map(|(w, s)| (w.clone(), s.clone())) else {
            state.settle_worker(id);
            return;
        };
        let Some(engine) = slot.engine.clone() else {
            warn!(worker_id = %id, "Queued worker has no engine, preparing again");
            self.prepare_worker(state, id);
            return;
        };

        slot.state = WorkerState::Running;
        let file = slot.worker.file.clone();
        let pool = self.clone();
        let run_work = work.clone();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let result = match &run_work {
                Work::Recognizer => engine.run_recognizer(&file).await,
                Work::FullText { pages } => engine.run_full_text(&file, pages.as_deref()).await,
            };
            debug!(
                worker_id = %id,
                work = %run_work,
                duration_ms = start.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "Engine call finished"
            );
            pool.on_work_finished(id, run_work, token, result);
        });
        slot.running = Some(RunningWork {
            work: work.clone(),
            token,
            abort: handle.abort_handle(),
        });
        state.tier_mut(tier).running.insert(id, ());

        debug!(worker_id = %id, work = %work, tier = %tier, state = "running", "Work admitted");
        let _ = sender.send(WorkUpdate::new(id, work, WorkUpdateKind::InProgress));
    }

    /// Cancel every pending work item, stop in-flight calls, drop the engine.
    fn reset_worker(&self, state: &mut PoolState, id: WorkerId) {
        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        slot.halt();
        slot.state = WorkerState::Pending;
        let tier = slot.worker.priority;
        let cancelled = slot.works.drain();
        state.unlist_worker(id, tier);

        if !cancelled.is_empty() {
            debug!(worker_id = %id, count = cancelled.len(), "Cancelling pending work");
        }
        for (work, sender) in cancelled {
            let _ = sender.send(WorkUpdate::new(id, work, WorkUpdateKind::Cancelled));
        }
    }

    /// Start one idle engine if the pool has nothing else going on.
    fn maybe_prewarm(&self, state: &mut PoolState) {
        if !self.inner.config.prewarm
            || state.idle_engine.is_some()
            || state.warming.is_some()
            || !state.is_idle()
        {
            return;
        }

        let token = state.token();
        state.warming = Some(token);
        let pool = self.clone();
        let provider = self.inner.provider.clone();
        tokio::spawn(async move {
            let result = provider.start().await;
            pool.on_prewarm_finished(token, result);
        });
        debug!(subsystem = "pool", "Pre-warming idle engine");
    }

    // =========================================================================
    // Completions (spawned tasks report back here)
    // =========================================================================

    fn on_engine_started(&self, id: WorkerId, token: u64, result: Result<Arc<dyn Engine>>) {
        let mut state = self.inner.state.write();

        let current = state
            .workers
            .get(&id)
            .and_then(|slot| slot.preparing.as_ref())
            .is_some_and(|p| p.token == token);
        if !current {
            if let Ok(engine) = result {
                Self::offer_idle_engine(&mut state, engine);
            }
            return;
        }

        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        slot.preparing = None;

        match result {
            Ok(engine) => {
                slot.engine = Some(engine);
                debug!(worker_id = %id, "Engine ready");
                state.settle_worker(id);
            }
            Err(e) => {
                warn!(worker_id = %id, error = %e, "Engine failed to start");
                slot.state = WorkerState::Failed;
                let reason = engine_failure(e);
                for (work, sender) in slot.works.drain() {
                    let _ = sender.send(WorkUpdate::new(
                        id,
                        work,
                        WorkUpdateKind::Failed(reason.clone()),
                    ));
                }
            }
        }

        self.start_work_if_needed(&mut state);
        self.maybe_prewarm(&mut state);
    }

    fn on_work_finished(&self, id: WorkerId, work: Work, token: u64, result: Result<JsonValue>) {
        let mut state = self.inner.state.write();

        let current = state
            .workers
            .get(&id)
            .and_then(|slot| slot.running.as_ref())
            .is_some_and(|r| r.token == token);
        if !current {
            warn!(worker_id = %id, work = %work, "Discarding stale engine completion");
            return;
        }

        let Some(slot) = state.workers.get_mut(&id) else {
            return;
        };
        slot.running = None;
        let tier = slot.worker.priority;
        let sender = slot.works.remove(&work);

        let kind = match result {
            Ok(data) => {
                if slot.worker.cache_data {
                    slot.cache.insert(work.clone(), data.clone());
                }
                WorkUpdateKind::ExtractedData(data)
            }
            Err(e) => {
                warn!(worker_id = %id, work = %work, error = %e, "Work failed");
                if slot.works.is_empty() {
                    slot.engine = None;
                }
                WorkUpdateKind::Failed(engine_failure(e))
            }
        };
        let failed_last = matches!(kind, WorkUpdateKind::Failed(_)) && slot.works.is_empty();

        state.unlist_worker(id, tier);
        if failed_last {
            if let Some(slot) = state.workers.get_mut(&id) {
                slot.state = WorkerState::Failed;
            }
        } else {
            state.settle_worker(id);
        }

        if let Some(sender) = sender {
            let _ = sender.send(WorkUpdate::new(id, work, kind));
        }

        self.start_work_if_needed(&mut state);
        self.maybe_prewarm(&mut state);
    }

    fn on_prewarm_finished(&self, token: u64, result: Result<Arc<dyn Engine>>) {
        let mut state = self.inner.state.write();
        if state.warming == Some(token) {
            state.warming = None;
        }
        match result {
            Ok(engine) => {
                Self::offer_idle_engine(&mut state, engine);
                info!(subsystem = "pool", "Idle engine warmed");
            }
            Err(e) => warn!(subsystem = "pool", error = %e, "Engine pre-warm failed"),
        }
    }

    /// Park an engine nobody is waiting for; drop it if the slot is taken.
    fn offer_idle_engine(state: &mut PoolState, engine: Arc<dyn Engine>) {
        if state.idle_engine.is_none() {
            trace!(subsystem = "pool", "Parking unclaimed engine as idle");
            state.idle_engine = Some(engine);
        } else {
            trace!(subsystem = "pool", "Dropping unclaimed engine");
        }
    }
}

fn engine_failure(error: Error) -> RecognitionError {
    match error {
        Error::Recognition(reason) => reason,
        other => RecognitionError::EngineFailure(other.to_string()),
    }
}
