//! Orchestrator structure and public surface
//!
//! Holds the long-lived collaborators, the active-task map with
//! cancellation tokens, and the priority dispatch queue. The execution
//! pipeline itself lives in `execute.rs`.

use crate::error::{Error, Result};
use crate::fanout::{SubscriptionHandle, SubscriptionManager};
use crate::modes::{Mode, ModeConfig, ModeManager, ModeStrategy};
use crate::pipeline::EventPipeline;
use crate::pool::WorkerPool;
use crate::registry::AgentRegistry;
use crate::shutdown::ShutdownController;
use crate::task::{Task, TaskStatus};
use dashmap::DashMap;
use maestro_events::EventKind;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// A task submission
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Natural-language request
    pub description: String,
    /// Project grouping, if any
    pub project_id: Option<Uuid>,
    /// Mode override; the manager's current mode when absent
    pub mode: Option<Mode>,
    /// Priority 0-100; defaults to 0
    pub priority: Option<u8>,
}

impl SubmitRequest {
    /// Create a request with defaults
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            project_id: None,
            mode: None,
            priority: None,
        }
    }

    /// Set the mode
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the project
    #[must_use]
    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Orchestrator statistics for the monitoring surface
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    /// Active mode at the time of the call
    pub current_mode: Mode,
    /// Tasks known to the orchestrator
    pub total_tasks: usize,
    /// Tasks waiting for a worker
    pub queued_tasks: usize,
    /// Tasks currently executing
    pub running_tasks: usize,
    /// Tasks in a terminal status
    pub terminal_tasks: usize,
    /// Worker pool size
    pub max_workers: usize,
    /// Busy workers
    pub busy_workers: usize,
    /// Agent executions in flight
    pub active_agents: usize,
}

/// Per-task execution state shared between the surface and the runner.
///
/// The strategy and config are snapshots taken at submission: a mode
/// switch mid-flight never changes a task that already started.
pub(crate) struct TaskHandle {
    pub(crate) state: RwLock<Task>,
    pub(crate) cancel: CancellationToken,
    pub(crate) approved: Notify,
    pub(crate) strategy: Arc<dyn ModeStrategy>,
    pub(crate) config: ModeConfig,
}

struct QueuedTask {
    priority: u8,
    seq: u64,
    task_id: Uuid,
}

/// The coordinator for task execution
pub struct Orchestrator {
    pub(crate) events: Arc<EventPipeline>,
    pub(crate) modes: Arc<ModeManager>,
    pub(crate) registry: Arc<AgentRegistry>,
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) fanout: Arc<SubscriptionManager>,
    pub(crate) tasks: DashMap<Uuid, Arc<TaskHandle>>,
    pub(crate) snapshot_interval: u64,
    pub(crate) shutdown_token: CancellationToken,
    pub(crate) shutdown_controller: Option<Arc<ShutdownController>>,
    queue: Mutex<Vec<QueuedTask>>,
    queue_seq: std::sync::atomic::AtomicU64,
    work_signal: Notify,
    task_slots: Arc<Semaphore>,
}

impl Orchestrator {
    /// Create an orchestrator; call [`Orchestrator::start`] on the Arc to
    /// begin dispatching
    #[must_use]
    pub fn new(
        events: Arc<EventPipeline>,
        modes: Arc<ModeManager>,
        registry: Arc<AgentRegistry>,
        pool: Arc<WorkerPool>,
        fanout: Arc<SubscriptionManager>,
    ) -> Self {
        let slots = pool.size();
        Self {
            events,
            modes,
            registry,
            pool,
            fanout,
            tasks: DashMap::new(),
            snapshot_interval: 50,
            shutdown_token: CancellationToken::new(),
            shutdown_controller: None,
            queue: Mutex::new(Vec::new()),
            queue_seq: std::sync::atomic::AtomicU64::new(0),
            work_signal: Notify::new(),
            task_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Override the snapshot interval (events per aggregate)
    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: u64) -> Self {
        self.snapshot_interval = interval.max(1);
        self
    }

    /// Tie the orchestrator into a shutdown controller: intake stops once
    /// shutdown begins, and active tasks are tracked for draining
    #[must_use]
    pub fn with_shutdown_controller(mut self, controller: Arc<ShutdownController>) -> Self {
        self.shutdown_token = controller.token();
        self.shutdown_controller = Some(controller);
        self
    }

    /// Spawn the dispatch loop. Queued tasks start in descending priority
    /// order as task slots free up.
    pub fn start(self: &Arc<Self>) {
        let orch = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = orch.shutdown_token.cancelled() => break,
                    () = orch.work_signal.notified() => {}
                }
                while let Some(task_id) = orch.pop_next().await {
                    let permit = match Arc::clone(&orch.task_slots).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let runner = Arc::clone(&orch);
                    tokio::spawn(async move {
                        let _permit = permit;
                        runner.run_task(task_id).await;
                    });
                }
            }
        });
    }

    async fn pop_next(&self) -> Option<Uuid> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return None;
        }
        // Highest priority first; FIFO within a priority
        let best = queue
            .iter()
            .enumerate()
            .max_by_key(|(_, q)| (q.priority, std::cmp::Reverse(q.seq)))
            .map(|(i, _)| i)?;
        Some(queue.remove(best).task_id)
    }

    /// Submit a task for execution. Returns the task id immediately.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid> {
        if let Some(controller) = &self.shutdown_controller {
            if !controller.is_accepting_work() {
                return Err(Error::Conflict("orchestrator is shutting down".into()));
            }
        }
        if request.description.trim().is_empty() {
            return Err(Error::Validation("description must not be empty".into()));
        }
        let priority = request.priority.unwrap_or(0);
        if priority > 100 {
            return Err(Error::Validation(format!(
                "priority {priority} outside [0, 100]"
            )));
        }

        let mode = match request.mode {
            Some(mode) => mode,
            None => self.modes.current().await,
        };
        let config = self.modes.config_for(mode).await;
        let strategy = self.modes.strategy(mode).await;

        let mut task = Task::new(request.description.clone(), mode, priority);
        if let Some(project_id) = request.project_id {
            task = task.with_project(project_id);
        }
        let task_id = task.id;

        self.events
            .publish_task(
                EventKind::TaskCreated,
                task_id,
                serde_json::json!({
                    "description": task.description,
                    "mode": mode,
                    "priority": priority,
                    "project_id": task.project_id,
                }),
            )
            .await;

        self.tasks.insert(
            task_id,
            Arc::new(TaskHandle {
                state: RwLock::new(task),
                cancel: self.shutdown_token.child_token(),
                approved: Notify::new(),
                strategy,
                config,
            }),
        );

        {
            let mut queue = self.queue.lock().await;
            queue.push(QueuedTask {
                priority,
                seq: self
                    .queue_seq
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
                task_id,
            });
        }
        self.work_signal.notify_one();

        info!(task_id = %task_id, mode = %mode, priority, "Task submitted");
        Ok(task_id)
    }

    fn handle(&self, task_id: Uuid) -> Result<Arc<TaskHandle>> {
        self.tasks
            .get(&task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    /// Snapshot of a task, including phases and results
    pub async fn get(&self, task_id: Uuid) -> Result<Task> {
        let handle = self.handle(task_id)?;
        let task = handle.state.read().await.clone();
        Ok(task)
    }

    /// All known tasks, newest first
    pub async fn list(&self) -> Vec<Task> {
        // Snapshot the handles first; shard guards must not be held
        // across an await
        let handles: Vec<Arc<TaskHandle>> = self
            .tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            tasks.push(handle.state.read().await.clone());
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Request cancellation of a task.
    ///
    /// Idempotent: cancelling a terminal task is a no-op. The task reaches
    /// `cancelled` at its next cancellation checkpoint.
    pub async fn cancel(&self, task_id: Uuid) -> Result<()> {
        let handle = self.handle(task_id)?;
        let status = handle.state.read().await.status;
        if status.is_terminal() {
            return Ok(());
        }
        handle.cancel.cancel();
        info!(task_id = %task_id, "Task cancellation requested");
        Ok(())
    }

    /// Retry a failed task as a new submission.
    ///
    /// Description, mode, priority, and project carry over; no state
    /// (files, tokens, cost) is copied.
    pub async fn retry(&self, task_id: Uuid) -> Result<Uuid> {
        let source = self.get(task_id).await?;
        if source.status != TaskStatus::Failed {
            return Err(Error::Validation(format!(
                "retry is only legal from failed, task is {}",
                source.status
            )));
        }

        let mut request = SubmitRequest::new(source.description)
            .with_mode(source.mode)
            .with_priority(source.priority);
        if let Some(project_id) = source.project_id {
            request = request.with_project(project_id);
        }
        self.submit(request).await
    }

    /// Approve a paused task, resuming execution
    pub async fn approve(&self, task_id: Uuid) -> Result<()> {
        let handle = self.handle(task_id)?;
        let status = handle.state.read().await.status;
        if status != TaskStatus::Paused {
            return Err(Error::Validation(format!(
                "task is {status}, approval applies to paused tasks"
            )));
        }
        handle.approved.notify_one();
        Ok(())
    }

    /// Subscribe to the real-time event stream
    pub async fn subscribe(&self, channels: Vec<String>) -> SubscriptionHandle {
        self.fanout.subscribe(channels).await
    }

    /// Orchestrator statistics
    pub async fn stats(&self) -> OrchestratorStats {
        let handles: Vec<Arc<TaskHandle>> = self
            .tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut queued = 0;
        let mut running = 0;
        let mut terminal = 0;
        for handle in handles {
            let status = handle.state.read().await.status;
            match status {
                TaskStatus::Pending => queued += 1,
                s if s.is_terminal() => terminal += 1,
                _ => running += 1,
            }
        }
        OrchestratorStats {
            current_mode: self.modes.current().await,
            total_tasks: self.tasks.len(),
            queued_tasks: queued,
            running_tasks: running,
            terminal_tasks: terminal,
            max_workers: self.pool.size(),
            busy_workers: self.pool.size() - self.pool.available(),
            active_agents: self.registry.active_count(),
        }
    }

    /// Wait until a task reaches a terminal status
    pub async fn wait(&self, task_id: Uuid, timeout: Duration) -> Result<Task> {
        let started = std::time::Instant::now();
        loop {
            let task = self.get(task_id).await?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            if started.elapsed() >= timeout {
                return Err(Error::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Cancel every non-terminal task and stop dispatching
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}
