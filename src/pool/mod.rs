//! Worker Pool: bounded-concurrency execution of strategies off the
//! request-serving path, with cooperative cancellation and per-task
//! progress.
//!
//! Built on `tokio` channels/tasks rather than a hand-rolled thread pool:
//! `tokio::sync::mpsc` bounded queues, `tokio::sync::broadcast` fan-out,
//! `tokio::spawn` workers.

mod task;

pub use task::TaskHandle;
use task::{QueuedTask, TaskRecord};

use crate::errors::EngineError;
use crate::metrics;
use crate::model::{OptimizationResult, TaskPhase, TaskPayload, TaskProgress, TaskType};
use crate::registry::AlgorithmRegistry;
use crate::strategies::{CancellationToken, StrategyInput};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

/// Recognized options from `pool.*`.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub min_threads: usize,
    pub max_threads: usize,
    pub max_queue: usize,
    pub idle_timeout_ms: u64,
    /// How long a terminal task's record survives before eviction.
    pub grace_period_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { min_threads: 4, max_threads: 12, max_queue: 256, idle_timeout_ms: 60_000, grace_period_ms: 60_000 }
    }
}

/// A point-in-time snapshot of pool occupancy and throughput.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolHealth {
    pub initialized: bool,
    pub completed: u64,
    pub utilization: f64,
    pub queue_size: usize,
    pub min_threads: usize,
    pub max_threads: usize,
}

type ProgressCallback = Arc<dyn Fn(TaskProgress) + Send + Sync>;

struct SharedState {
    config: WorkerPoolConfig,
    registry: Arc<AlgorithmRegistry>,
    tasks: Mutex<HashMap<String, TaskRecord>>,
    progress_callbacks: Mutex<HashMap<String, ProgressCallback>>,
    results: Mutex<HashMap<String, OptimizationResult>>,
    completed: AtomicU64,
    active: AtomicU64,
    draining: AtomicBool,
}

/// Bounded-concurrency executor for strategy tasks.
pub struct WorkerPool {
    shared: Arc<SharedState>,
    sender: mpsc::Sender<QueuedTask>,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, registry: Arc<AlgorithmRegistry>) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue);
        let shared = Arc::new(SharedState {
            config: config.clone(),
            registry,
            tasks: Mutex::new(HashMap::new()),
            progress_callbacks: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            completed: AtomicU64::new(0),
            active: AtomicU64::new(0),
            draining: AtomicBool::new(false),
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let semaphore = Arc::new(Semaphore::new(config.max_threads));
        let mut handles = Vec::with_capacity(config.max_threads);
        for worker_id in 0..config.max_threads {
            let receiver = receiver.clone();
            let shared = shared.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, receiver, shared, semaphore).await;
            }));
        }

        let pool = Self { shared, sender, worker_handles: Mutex::new(handles) };
        pool.spawn_grace_sweeper();
        pool
    }

    fn spawn_grace_sweeper(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(shared.config.idle_timeout_ms.max(1_000)));
            loop {
                interval.tick().await;
                let grace = chrono::Duration::milliseconds(shared.config.grace_period_ms as i64);
                let now = Utc::now();
                shared.tasks.lock().retain(|_, record| match record.completed_at {
                    Some(completed_at) => now - completed_at < grace,
                    None => true,
                });
            }
        });
    }

    /// Submit a task. Fails fast with `ERR_QUEUE_FULL` when the bounded
    /// queue is saturated rather than blocking, and with
    /// `ERR_POOL_NOT_READY` once the pool has entered drain mode.
    pub fn submit(
        &self,
        task_type: TaskType,
        payload: TaskPayload,
        timeout: Duration,
        on_progress: ProgressCallback,
    ) -> Result<TaskHandle, EngineError> {
        if self.shared.draining.load(Ordering::SeqCst) {
            return Err(EngineError::pool_not_ready());
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let record = TaskRecord {
            task_type,
            phase: TaskPhase::Queued,
            progress: 0,
            message: None,
            started_at: None,
            completed_at: None,
            token: token.clone(),
        };
        on_progress(record.to_progress(&task_id));
        self.shared.tasks.lock().insert(task_id.clone(), record);

        let queued = QueuedTask {
            task_id: task_id.clone(),
            task_type,
            payload,
            timeout,
            token: token.clone(),
            submitted_at: Utc::now(),
        };

        match self.sender.try_send(queued) {
            Ok(()) => {
                metrics::task_submitted(task_type_label(task_type));
                self.shared.progress_callbacks.lock().insert(task_id.clone(), on_progress);
                Ok(TaskHandle { task_id, token })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.tasks.lock().remove(&task_id);
                Err(EngineError::queue_full())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.tasks.lock().remove(&task_id);
                Err(EngineError::pool_not_ready())
            }
        }
    }

    pub fn progress(&self, task_id: &str) -> Option<TaskProgress> {
        self.shared.tasks.lock().get(task_id).map(|record| record.to_progress(task_id))
    }

    /// Pop a completed task's result. Returns `None` if the task hasn't
    /// completed successfully or its result has already been taken.
    pub fn take_result(&self, task_id: &str) -> Option<OptimizationResult> {
        self.shared.results.lock().remove(task_id)
    }

    pub fn health(&self) -> PoolHealth {
        let active = self.shared.active.load(Ordering::SeqCst) as f64;
        let max_threads = self.shared.config.max_threads;
        let utilization = if max_threads > 0 { active / max_threads as f64 } else { 0.0 };
        metrics::pool_utilization(utilization);
        metrics::pool_queue_size(self.sender.capacity());
        PoolHealth {
            initialized: true,
            completed: self.shared.completed.load(Ordering::SeqCst),
            utilization,
            queue_size: self.shared.config.max_queue - self.sender.capacity(),
            min_threads: self.shared.config.min_threads,
            max_threads,
        }
    }

    /// Enter drain mode: reject new submissions, await in-flight tasks
    /// reaching a terminal state, then force-cancel stragglers once
    /// `hard_stop` elapses.
    pub async fn shutdown(&self, hard_stop: Duration) {
        self.shared.draining.store(true, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + hard_stop;

        loop {
            let still_running = self.shared.active.load(Ordering::SeqCst) > 0;
            if !still_running || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if self.shared.active.load(Ordering::SeqCst) > 0 {
            warn!("worker pool hard-stop reached with tasks still active; force-cancelling");
            for record in self.shared.tasks.lock().values() {
                record.token.cancel();
            }
        }

        for handle in self.worker_handles.lock().iter() {
            handle.abort();
        }
    }
}

fn task_type_label(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::OneD => "1D",
        TaskType::TwoD => "2D",
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
    shared: Arc<SharedState>,
    semaphore: Arc<Semaphore>,
) {
    loop {
        let task = {
            let mut guard = receiver.lock().await;
            guard.recv().await
        };
        let Some(task) = task else {
            debug!(worker_id, "worker loop exiting: queue closed");
            return;
        };

        let _permit = semaphore.acquire().await.expect("semaphore not closed");
        shared.active.fetch_add(1, Ordering::SeqCst);
        execute(&shared, task).await;
        shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn execute(shared: &Arc<SharedState>, task: QueuedTask) {
    let QueuedTask { task_id, task_type, payload, timeout, token, submitted_at: _ } = task;

    if token.is_cancelled() {
        finish(shared, &task_id, TaskPhase::Cancelled, None);
        return;
    }

    update(shared, &task_id, TaskPhase::Running, 10, None, Some(Utc::now()), None);

    let strategy = match shared.registry.get(task_type, &payload.algorithm) {
        Ok(strategy) => strategy,
        Err(err) => {
            finish(shared, &task_id, TaskPhase::Failed, Some(err.to_string()));
            return;
        }
    };

    let run_token = token.clone();
    let task_id_for_progress = task_id.clone();
    let shared_for_progress = shared.clone();
    let progress_fn = move |p: u8| {
        update(&shared_for_progress, &task_id_for_progress, TaskPhase::Running, p.min(99), None, None, None);
    };

    let pieces = payload.pieces.clone();
    let stocks = payload.stocks.clone();
    let options = payload.options;
    let algorithm = payload.algorithm.clone();

    let blocking = tokio::task::spawn_blocking(move || {
        let input = StrategyInput { pieces: &pieces, stocks: &stocks, options, token: &run_token, progress: &progress_fn };
        strategy.run(input)
    });

    let start = std::time::Instant::now();
    let outcome = tokio::time::timeout(timeout, blocking).await;

    match outcome {
        Err(_elapsed) => {
            token.cancel();
            finish(shared, &task_id, TaskPhase::Timeout, Some("deadline exceeded".into()));
        }
        Ok(Err(join_err)) => {
            finish(shared, &task_id, TaskPhase::Failed, Some(format!("strategy panicked: {join_err}")));
        }
        Ok(Ok(Err(engine_err))) => {
            finish(shared, &task_id, TaskPhase::Failed, Some(engine_err.to_string()));
        }
        Ok(Ok(Ok(result))) => {
            metrics::optimization_duration(task_type_label(task_type), algorithm, start.elapsed());
            if token.is_cancelled() && !result.success {
                finish(shared, &task_id, TaskPhase::Cancelled, None);
            } else {
                shared.results.lock().insert(task_id.clone(), result);
                finish(shared, &task_id, TaskPhase::Completed, None);
            }
        }
    }
}

fn update(
    shared: &Arc<SharedState>,
    task_id: &str,
    phase: TaskPhase,
    progress: u8,
    message: Option<String>,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
) {
    let snapshot = {
        let mut tasks = shared.tasks.lock();
        if let Some(record) = tasks.get_mut(task_id) {
            record.phase = phase;
            record.progress = progress;
            if message.is_some() {
                record.message = message;
            }
            if started_at.is_some() {
                record.started_at = started_at;
            }
            if completed_at.is_some() {
                record.completed_at = completed_at;
            }
            Some(record.to_progress(task_id))
        } else {
            None
        }
    };
    if let Some(progress) = snapshot {
        if let Some(cb) = shared.progress_callbacks.lock().get(task_id) {
            cb(progress);
        }
    }
}

fn finish(shared: &Arc<SharedState>, task_id: &str, phase: TaskPhase, message: Option<String>) {
    let task_type = shared.tasks.lock().get(task_id).map(|r| r.task_type);
    let progress_value = if phase == TaskPhase::Completed { 100 } else { 0 };
    update(shared, task_id, phase, progress_value, message, None, Some(Utc::now()));
    if phase == TaskPhase::Completed {
        shared.completed.fetch_add(1, Ordering::SeqCst);
        metrics::pool_completed_total_increment();
    }
    if let Some(task_type) = task_type {
        metrics::task_finished(
            task_type_label(task_type),
            match phase {
                TaskPhase::Completed => "completed",
                TaskPhase::Failed => "failed",
                TaskPhase::Cancelled => "cancelled",
                TaskPhase::Timeout => "timeout",
                _ => "unknown",
            },
        );
    }
    shared.progress_callbacks.lock().remove(task_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Piece, Stock, StrategyOptions, TaskPayload};
    use crate::registry::{AlgorithmRegistry, ALGO_1D_FFD};
    use std::sync::Mutex as StdMutex;

    fn payload() -> TaskPayload {
        TaskPayload {
            algorithm: ALGO_1D_FFD.to_string(),
            pieces: vec![Piece { id: "p".into(), width: 100.0, height: 1.0, quantity: 1, order_item_id: "oi".into(), can_rotate: false }],
            stocks: vec![Stock { id: "s".into(), width: 1000.0, height: 1.0, available: 1 }],
            options: StrategyOptions::default(),
        }
    }

    #[tokio::test]
    async fn submits_and_completes_a_task() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 2, ..Default::default() }, Arc::new(AlgorithmRegistry::new()));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handle = pool
            .submit(TaskType::OneD, payload(), Duration::from_secs(5), Arc::new(move |p: TaskProgress| {
                seen_clone.lock().unwrap().push(p.phase);
            }))
            .unwrap();

        for _ in 0..200 {
            if let Some(result) = pool.take_result(&handle.task_id) {
                assert!(result.success);
                let phases = seen.lock().unwrap().clone();
                assert!(phases.contains(&TaskPhase::Queued));
                assert!(phases.contains(&TaskPhase::Running));
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not complete in time");
    }

    #[tokio::test]
    async fn queue_full_fails_fast() {
        let pool = WorkerPool::new(
            WorkerPoolConfig { max_threads: 1, max_queue: 1, ..Default::default() },
            Arc::new(AlgorithmRegistry::new()),
        );
        // Flood more submissions than the single-slot queue can possibly
        // absorb; reliably reproducing a busy worker without a sleep-based
        // strategy isn't worth the flakiness, so we just oversubscribe.
        let mut saw_queue_full = false;
        for _ in 0..64 {
            let result = pool.submit(TaskType::OneD, payload(), Duration::from_secs(5), Arc::new(|_| {}));
            if let Err(err) = result {
                assert_eq!(err.code.as_str(), "ERR_QUEUE_FULL");
                saw_queue_full = true;
                break;
            }
        }
        assert!(saw_queue_full, "expected at least one ERR_QUEUE_FULL under flooding");
    }

    #[tokio::test]
    async fn cancel_after_terminal_is_a_no_op() {
        let pool = WorkerPool::new(WorkerPoolConfig { max_threads: 2, ..Default::default() }, Arc::new(AlgorithmRegistry::new()));
        let handle = pool.submit(TaskType::OneD, payload(), Duration::from_secs(5), Arc::new(|_| {})).unwrap();
        for _ in 0..200 {
            if pool.take_result(&handle.task_id).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.cancel();
        handle.cancel();
    }
}
