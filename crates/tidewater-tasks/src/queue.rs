//! FIFO task queue with a single executor.
//!
//! Many request handlers call [`TaskQueue::enqueue`] concurrently. Sequence
//! numbers are assigned and tasks handed to the executor under one intake
//! lock, so execution order is submission order. The executor is the only
//! writer of [`NodeState`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tide_core::config::{TasksSection, parse_duration};
use tide_core::{CoreResult, SegmentId};

use crate::completion::{Completer, Completion, completion};
use crate::error::{TaskError, TaskResult};
use crate::metrics::{TaskMetrics, TaskMetricsSnapshot};
use crate::state::{NodeState, SegmentInfo};
use crate::task::{NodeTask, TaskContext, TaskKind};

/// Called after each task's `notify`, before its completion fires.
///
/// An error is logged and does not change the task's result.
pub type TaskObserver =
    Arc<dyn Fn(&TaskContext, TaskKind, &TaskResult<()>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Default bound for [`TaskQueue::submit`].
    pub wait_timeout: Duration,
    /// Prefix of stream subscriptions created by watch tasks.
    pub subscription_prefix: String,
}

impl QueueConfig {
    pub fn from_section(section: &TasksSection) -> CoreResult<Self> {
        Ok(Self {
            wait_timeout: parse_duration(&section.wait_timeout)?,
            subscription_prefix: section.subscription_prefix.clone(),
        })
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            subscription_prefix: "tidewater-querynode".to_string(),
        }
    }
}

/// A task waiting for the executor.
struct Queued {
    task: NodeTask,
    ctx: TaskContext,
    completer: Completer,
}

struct Intake {
    /// `None` once the queue is closed.
    tx: Option<mpsc::UnboundedSender<Queued>>,
    next_seq: u64,
}

/// Caller's view of an enqueued task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    ctx: TaskContext,
    kind: TaskKind,
    completion: Completion,
}

impl TaskHandle {
    pub fn seq(&self) -> u64 {
        self.ctx.seq
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Wait for the task's result.
    pub async fn wait(&self) -> TaskResult<()> {
        self.completion.wait().await
    }

    /// Wait at most `timeout`. On expiry the task keeps running.
    pub async fn wait_timeout(&self, timeout: Duration) -> TaskResult<()> {
        match tokio::time::timeout(timeout, self.completion.wait()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(seq = self.ctx.seq, kind = %self.kind, "caller stopped waiting for task");
                Err(TaskError::DeadlineExceeded(timeout))
            }
        }
    }

    pub fn try_result(&self) -> Option<TaskResult<()>> {
        self.completion.try_result()
    }
}

/// Serializes control operations against node-local state.
pub struct TaskQueue {
    config: QueueConfig,
    state: Arc<RwLock<NodeState>>,
    metrics: Arc<TaskMetrics>,
    observer: Option<TaskObserver>,
    intake: Mutex<Intake>,
    /// Held until `start` hands it to the executor.
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Queued>>>,
    executor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Create a queue. Tasks are accepted immediately and run once
    /// [`start`](Self::start) is called.
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            state: Arc::new(RwLock::new(NodeState::new())),
            metrics: Arc::new(TaskMetrics::new()),
            observer: None,
            intake: Mutex::new(Intake {
                tx: Some(tx),
                next_seq: 0,
            }),
            pending_rx: Mutex::new(Some(rx)),
            executor: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: TaskObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Spawn the executor. Later calls do nothing.
    pub async fn start(&self) {
        let mut executor = self.executor.lock().await;
        let Some(rx) = lock(&self.pending_rx).take() else {
            debug!("task executor already started");
            return;
        };

        let state = Arc::clone(&self.state);
        let metrics = Arc::clone(&self.metrics);
        let observer = self.observer.clone();
        let config = self.config.clone();
        *executor = Some(tokio::spawn(async move {
            run_executor(rx, state, config, metrics, observer).await;
        }));
        info!("task executor started");
    }

    /// Submit a task.
    ///
    /// `timeout` bounds the task's context deadline. Fails only when the
    /// queue is closed.
    pub fn enqueue(&self, task: NodeTask, timeout: Option<Duration>) -> TaskResult<TaskHandle> {
        let mut intake = lock(&self.intake);
        let seq = intake.next_seq;
        let Some(tx) = intake.tx.as_ref() else {
            return Err(TaskError::QueueClosed);
        };

        let ctx = TaskContext::new(seq, timeout);
        let kind = task.kind();
        let (completer, completion) = completion();
        tx.send(Queued {
            task,
            ctx: ctx.clone(),
            completer,
        })
        .map_err(|_| TaskError::QueueClosed)?;
        intake.next_seq += 1;
        drop(intake);

        self.metrics.record_enqueued();
        debug!(seq, %kind, "task enqueued");
        Ok(TaskHandle {
            ctx,
            kind,
            completion,
        })
    }

    /// Enqueue and wait up to the configured `wait_timeout`.
    pub async fn submit(&self, task: NodeTask) -> TaskResult<()> {
        let timeout = self.config.wait_timeout;
        self.enqueue(task, Some(timeout))?.wait_timeout(timeout).await
    }

    /// Stop accepting tasks, let queued ones finish, and wait for the
    /// executor to exit. If the executor never started, queued tasks are
    /// completed with [`TaskError::QueueClosed`].
    ///
    /// Concurrent callers all return only after the queue has drained.
    pub async fn close(&self) {
        // Held until draining is done; later closers wait on it.
        let mut executor = self.executor.lock().await;
        let Some(tx) = lock(&self.intake).tx.take() else {
            return;
        };
        drop(tx);

        match executor.take() {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(error = %e, "task executor panicked");
                }
            }
            None => {
                let rx = lock(&self.pending_rx).take();
                if let Some(mut rx) = rx {
                    while let Ok(queued) = rx.try_recv() {
                        queued.completer.complete(Err(TaskError::QueueClosed));
                    }
                }
            }
        }
        info!("task queue closed");
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.intake).tx.is_none()
    }

    /// Snapshot of node state.
    pub fn state(&self) -> NodeState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn segment_info(&self, ids: &[SegmentId]) -> Vec<SegmentInfo> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .segment_info(ids)
    }

    pub fn metrics(&self) -> TaskMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_executor(
    mut rx: mpsc::UnboundedReceiver<Queued>,
    state: Arc<RwLock<NodeState>>,
    config: QueueConfig,
    metrics: Arc<TaskMetrics>,
    observer: Option<TaskObserver>,
) {
    while let Some(queued) = rx.recv().await {
        execute_one(queued, &state, &config, &metrics, observer.as_ref());
    }
    debug!("task executor drained");
}

fn execute_one(
    queued: Queued,
    state: &RwLock<NodeState>,
    config: &QueueConfig,
    metrics: &TaskMetrics,
    observer: Option<&TaskObserver>,
) {
    let Queued {
        task,
        ctx,
        completer,
    } = queued;
    let kind = task.kind();

    if ctx.is_expired() {
        debug!(seq = ctx.seq, %kind, "task past its deadline, executing anyway");
    }

    let result = task.validate().and_then(|()| {
        let mut state = state.write().unwrap_or_else(PoisonError::into_inner);
        catch_unwind(AssertUnwindSafe(|| task.execute(&mut state, config)))
            .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(&*panic))))
    });

    task.notify(&ctx, &result, metrics);
    if let Some(observer) = observer {
        if let Err(e) = observer(&ctx, kind, &result) {
            warn!(seq = ctx.seq, %kind, error = %e, "task observer failed");
        }
    }
    completer.complete(result);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
