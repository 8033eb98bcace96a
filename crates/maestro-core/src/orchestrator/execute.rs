//! Task execution pipeline
//!
//! One coordinating flow per task: analyze, decompose, optionally pause
//! for approval, execute phases level by level, finalize. Cancellation is
//! checked at every phase boundary and worker return; retries with
//! exponential backoff absorb transient and provider failures.

use super::analyze::classify_complexity;
use super::core::{Orchestrator, TaskHandle};
use crate::agent::AgentTask;
use crate::error::{Error, ErrorKind, Result, TaskError};
use crate::queue::TaskQueue;
use crate::retry::backoff_delay;
use crate::task::{Complexity, Phase, PhaseStatus, SubtaskStatus, TaskStatus};
use maestro_events::{EventKind, Snapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one phase
enum PhaseOutcome {
    Completed,
    Skipped,
    Failed,
    Cancelled,
    CostExceeded,
}

/// Result of one subtask after retries
enum SubtaskOutcome {
    Success,
    Failed,
    Cancelled,
}

/// Reject plans whose dependency ids are unknown, point forward, or form
/// a cycle within a phase
pub(crate) fn validate_plan(phases: &[Phase]) -> Result<()> {
    let mut earlier: HashSet<Uuid> = HashSet::new();

    for (index, phase) in phases.iter().enumerate() {
        if phase.number != index as u32 + 1 {
            return Err(Error::Validation(format!(
                "invalid plan: phase numbers must increase from 1, found {} at position {}",
                phase.number, index
            )));
        }

        let same_phase: HashSet<Uuid> = phase.subtasks.iter().map(|s| s.id).collect();
        let mut queue = TaskQueue::new();
        for subtask in &phase.subtasks {
            for dep in &subtask.depends_on {
                if !earlier.contains(dep) && !same_phase.contains(dep) {
                    return Err(Error::Validation(format!(
                        "invalid plan: subtask {} depends on unknown id {dep}",
                        subtask.id
                    )));
                }
            }
            queue.add_task(
                subtask.id,
                subtask
                    .depends_on
                    .iter()
                    .filter(|dep| same_phase.contains(dep))
                    .copied(),
            );
        }

        // Kahn over same-phase edges; anything left is a cycle
        loop {
            let available = queue.available_tasks();
            if available.is_empty() {
                if !queue.is_complete() {
                    return Err(Error::Validation(format!(
                        "invalid plan: cyclic dependencies in phase {}",
                        phase.number
                    )));
                }
                break;
            }
            for id in available {
                queue.mark_completed(id);
            }
        }

        earlier.extend(same_phase);
    }
    Ok(())
}

/// Flatten prior results into a context map of `<agentType>Result` keys
fn gather_prior_results(task: &crate::task::Task) -> HashMap<String, serde_json::Value> {
    let mut prior = HashMap::new();
    for value in task.results.values() {
        if let Some(map) = value.as_object() {
            for (key, entry) in map {
                prior.insert(key.clone(), entry.clone());
            }
        }
    }
    prior
}

impl Orchestrator {
    /// Entry point for the dispatcher
    pub(crate) async fn run_task(self: &Arc<Self>, task_id: Uuid) {
        let Some(handle) = self.tasks.get(&task_id).map(|e| Arc::clone(e.value())) else {
            return;
        };
        let _drain_guard = self
            .shutdown_controller
            .as_ref()
            .map(|controller| controller.register_task());
        if let Err(e) = self.execute_task(&handle).await {
            error!(task_id = %task_id, error = %e, "Task pipeline fault");
            let mut task = handle.state.write().await;
            if !task.status.is_terminal() {
                task.record_error(TaskError::from_error(&e, None, None));
                task.status = TaskStatus::Failed;
                task.completed_at = Some(chrono::Utc::now());
                drop(task);
                self.publish_terminal(&handle, EventKind::TaskFailed).await;
            }
        }
    }

    async fn execute_task(self: &Arc<Self>, handle: &Arc<TaskHandle>) -> Result<()> {
        let task_id = handle.state.read().await.id;

        if handle.cancel.is_cancelled() {
            return self.finish_cancelled(handle).await;
        }

        // Analyze
        let complexity = {
            let mut task = handle.state.write().await;
            task.transition(TaskStatus::Analyzing)?;
            let complexity = classify_complexity(&task.description);
            task.complexity = Some(complexity);
            complexity
        };
        self.events
            .publish_task(
                EventKind::TaskStarted,
                task_id,
                serde_json::json!({"complexity": complexity}),
            )
            .await;

        // Decompose under the strategy snapshot taken at submission
        let description = handle.state.read().await.description.clone();
        let phases = handle.strategy.decompose(&description);
        if let Err(e) = validate_plan(&phases) {
            warn!(task_id = %task_id, error = %e, "Plan rejected");
            {
                let mut task = handle.state.write().await;
                task.record_error(TaskError::from_error(&e, None, None));
                task.transition(TaskStatus::Failed)?;
            }
            self.publish_terminal(handle, EventKind::TaskFailed).await;
            return Ok(());
        }
        let phase_count = phases.len();
        handle.state.write().await.phases = phases;

        // Approval gate
        if handle.config.requires_human_approval {
            handle.state.write().await.transition(TaskStatus::Paused)?;
            self.events
                .publish_task(EventKind::TaskPaused, task_id, serde_json::json!({}))
                .await;
            tokio::select! {
                () = handle.cancel.cancelled() => return self.finish_cancelled(handle).await,
                () = handle.approved.notified() => {}
            }
            handle.state.write().await.transition(TaskStatus::Running)?;
            self.events
                .publish_task(EventKind::TaskResumed, task_id, serde_json::json!({}))
                .await;
        } else {
            handle.state.write().await.transition(TaskStatus::Running)?;
        }

        // Execute phases in order
        for index in 0..phase_count {
            if handle.cancel.is_cancelled() {
                return self.finish_cancelled(handle).await;
            }
            handle.state.write().await.current_phase = index as u32;

            match self.run_phase(handle, index).await {
                PhaseOutcome::Completed | PhaseOutcome::Skipped => {
                    self.maybe_snapshot(handle).await;
                }
                PhaseOutcome::Failed => {
                    handle.state.write().await.transition(TaskStatus::Failed)?;
                    self.publish_terminal(handle, EventKind::TaskFailed).await;
                    return Ok(());
                }
                PhaseOutcome::CostExceeded => {
                    handle.state.write().await.transition(TaskStatus::Failed)?;
                    self.publish_terminal(handle, EventKind::TaskFailed).await;
                    return Ok(());
                }
                PhaseOutcome::Cancelled => return self.finish_cancelled(handle).await,
            }
        }

        // Finalize
        let ok = handle.state.read().await.required_phases_ok();
        let kind = if ok {
            handle.state.write().await.transition(TaskStatus::Completed)?;
            EventKind::TaskCompleted
        } else {
            handle.state.write().await.transition(TaskStatus::Failed)?;
            EventKind::TaskFailed
        };
        self.publish_terminal(handle, kind).await;
        self.maybe_snapshot(handle).await;
        Ok(())
    }

    async fn publish_terminal(&self, handle: &Arc<TaskHandle>, kind: EventKind) {
        let (task_id, data) = {
            let task = handle.state.read().await;
            let duration_ms = match (task.started_at, task.completed_at) {
                (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
                _ => 0,
            };
            (
                task.id,
                serde_json::json!({
                    "status": task.status,
                    "files_modified": task.files_modified,
                    "tokens_used": task.tokens_used,
                    "cost_micros": task.cost.as_micros(),
                    "errors": task.errors,
                    "duration_ms": duration_ms,
                }),
            )
        };
        self.events.publish_task(kind, task_id, data).await;
        info!(task_id = %task_id, kind = %kind, "Task finished");
    }

    async fn finish_cancelled(&self, handle: &Arc<TaskHandle>) -> Result<()> {
        {
            let mut task = handle.state.write().await;
            if task.status.is_terminal() {
                return Ok(());
            }
            task.transition(TaskStatus::Cancelled)?;
        }
        self.publish_terminal(handle, EventKind::TaskCancelled).await;
        Ok(())
    }

    async fn set_phase_status(
        &self,
        handle: &Arc<TaskHandle>,
        phase_idx: usize,
        status: PhaseStatus,
        duration: Option<Duration>,
    ) {
        let mut task = handle.state.write().await;
        if let Some(phase) = task.phases.get_mut(phase_idx) {
            phase.status = status;
            if let Some(duration) = duration {
                phase.duration_ms = Some(duration.as_millis() as u64);
            }
        }
    }

    /// Files collected by this phase's subtasks
    async fn phase_files(&self, handle: &Arc<TaskHandle>, phase_idx: usize) -> Vec<String> {
        let task = handle.state.read().await;
        let mut files = Vec::new();
        if let Some(phase) = task.phases.get(phase_idx) {
            for subtask in &phase.subtasks {
                if let Some(output) = &subtask.output {
                    for file in &output.files_modified {
                        if !files.contains(file) {
                            files.push(file.clone());
                        }
                    }
                }
            }
        }
        files
    }

    async fn run_phase(self: &Arc<Self>, handle: &Arc<TaskHandle>, phase_idx: usize) -> PhaseOutcome {
        let started = Instant::now();
        let (task_id, number, name, parallel, required, kinds, subtask_count) = {
            let task = handle.state.read().await;
            let phase = &task.phases[phase_idx];
            (
                task.id,
                phase.number,
                phase.name.clone(),
                phase.parallel,
                phase.required,
                phase.agent_kinds(),
                phase.subtasks.len(),
            )
        };

        self.events
            .publish_task(
                EventKind::PhaseStarted,
                task_id,
                serde_json::json!({"phase": number, "name": name}),
            )
            .await;
        self.set_phase_status(handle, phase_idx, PhaseStatus::Running, None).await;

        // Empty phases auto-complete
        if subtask_count == 0 {
            self.set_phase_status(handle, phase_idx, PhaseStatus::Completed, Some(started.elapsed()))
                .await;
            self.events
                .publish_task(
                    EventKind::PhaseCompleted,
                    task_id,
                    serde_json::json!({
                        "phase": number,
                        "name": name,
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "files": [],
                    }),
                )
                .await;
            return PhaseOutcome::Completed;
        }

        let levels = match self.registry.execution_order(&kinds) {
            Ok(levels) => levels,
            Err(e) => {
                handle
                    .state
                    .write()
                    .await
                    .record_error(TaskError::from_error(&e, Some(number), None));
                return self
                    .fail_or_skip_phase(handle, phase_idx, required, started)
                    .await;
            }
        };

        let mut failed = false;
        'levels: for level in levels {
            if handle.cancel.is_cancelled() {
                return PhaseOutcome::Cancelled;
            }

            // Subtasks of this level, in plan order
            let level_subtasks: Vec<usize> = {
                let task = handle.state.read().await;
                task.phases[phase_idx]
                    .subtasks
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| level.contains(&s.agent))
                    .map(|(i, _)| i)
                    .collect()
            };

            if parallel {
                let outcomes = futures::future::join_all(
                    level_subtasks
                        .iter()
                        .map(|&subtask_idx| self.run_subtask(handle, phase_idx, subtask_idx)),
                )
                .await;
                for outcome in outcomes {
                    match outcome {
                        SubtaskOutcome::Success => {}
                        SubtaskOutcome::Failed => failed = true,
                        SubtaskOutcome::Cancelled => return PhaseOutcome::Cancelled,
                    }
                }
                if let Some(outcome) = self.check_cost(handle, phase_idx, number).await {
                    return outcome;
                }
                if failed {
                    break 'levels;
                }
            } else {
                for &subtask_idx in &level_subtasks {
                    if handle.cancel.is_cancelled() {
                        return PhaseOutcome::Cancelled;
                    }
                    match self.run_subtask(handle, phase_idx, subtask_idx).await {
                        SubtaskOutcome::Success => {}
                        SubtaskOutcome::Failed => {
                            failed = true;
                            break 'levels;
                        }
                        SubtaskOutcome::Cancelled => return PhaseOutcome::Cancelled,
                    }
                    if let Some(outcome) = self.check_cost(handle, phase_idx, number).await {
                        return outcome;
                    }
                }
            }
        }

        if failed {
            return self
                .fail_or_skip_phase(handle, phase_idx, required, started)
                .await;
        }

        let files = self.phase_files(handle, phase_idx).await;
        self.set_phase_status(handle, phase_idx, PhaseStatus::Completed, Some(started.elapsed()))
            .await;
        self.events
            .publish_task(
                EventKind::PhaseCompleted,
                task_id,
                serde_json::json!({
                    "phase": number,
                    "name": name,
                    "duration_ms": started.elapsed().as_millis() as u64,
                    "files": files,
                }),
            )
            .await;
        PhaseOutcome::Completed
    }

    /// Required phases fail the task; optional phases are skipped
    async fn fail_or_skip_phase(
        &self,
        handle: &Arc<TaskHandle>,
        phase_idx: usize,
        required: bool,
        started: Instant,
    ) -> PhaseOutcome {
        let (task_id, number, name) = {
            let task = handle.state.read().await;
            let phase = &task.phases[phase_idx];
            (task.id, phase.number, phase.name.clone())
        };
        let files = self.phase_files(handle, phase_idx).await;
        let data = serde_json::json!({
            "phase": number,
            "name": name,
            "duration_ms": started.elapsed().as_millis() as u64,
            "files": files,
        });

        if required {
            self.set_phase_status(handle, phase_idx, PhaseStatus::Failed, Some(started.elapsed()))
                .await;
            self.events
                .publish_task(EventKind::PhaseFailed, task_id, data)
                .await;
            PhaseOutcome::Failed
        } else {
            self.set_phase_status(handle, phase_idx, PhaseStatus::Skipped, Some(started.elapsed()))
                .await;
            self.events
                .publish_task(EventKind::PhaseSkipped, task_id, data)
                .await;
            PhaseOutcome::Skipped
        }
    }

    /// Cost-cap and strategy continuation check after a subtask
    async fn check_cost(
        &self,
        handle: &Arc<TaskHandle>,
        phase_idx: usize,
        phase_number: u32,
    ) -> Option<PhaseOutcome> {
        let (task_id, spent) = {
            let task = handle.state.read().await;
            (task.id, task.cost)
        };

        let over_cap = handle
            .config
            .cost_limit
            .is_some_and(|limit| spent > limit);
        let strategy_stop = !handle.strategy.should_continue(spent);
        if !over_cap && !strategy_stop {
            return None;
        }

        let limit = handle.config.cost_limit.unwrap_or(spent);
        warn!(task_id = %task_id, spent = %spent, limit = %limit, "Cost limit reached");
        self.events
            .publish_task(
                EventKind::CostLimitReached,
                task_id,
                serde_json::json!({
                    "spent_micros": spent.as_micros(),
                    "limit_micros": limit.as_micros(),
                }),
            )
            .await;
        {
            let mut task = handle.state.write().await;
            task.record_error(TaskError::from_error(
                &Error::CostExceeded { spent, limit },
                Some(phase_number),
                None,
            ));
        }
        self.set_phase_status(handle, phase_idx, PhaseStatus::Failed, None).await;
        self.events
            .publish_task(
                EventKind::PhaseFailed,
                task_id,
                serde_json::json!({"phase": phase_number, "reason": "cost_exceeded"}),
            )
            .await;
        Some(PhaseOutcome::CostExceeded)
    }

    async fn run_subtask(
        self: &Arc<Self>,
        handle: &Arc<TaskHandle>,
        phase_idx: usize,
        subtask_idx: usize,
    ) -> SubtaskOutcome {
        // Snapshot everything the agent call needs
        let (task_id, phase_number, subtask, model, prior, deps_ok) = {
            let task = handle.state.read().await;
            let phase = &task.phases[phase_idx];
            let subtask = phase.subtasks[subtask_idx].clone();
            let deps_ok = subtask.depends_on.iter().all(|dep| {
                task.phases
                    .iter()
                    .flat_map(|p| &p.subtasks)
                    .any(|s| s.id == *dep && s.status == SubtaskStatus::Completed)
            });
            let complexity = task.complexity.unwrap_or(Complexity::Medium);
            (
                task.id,
                phase.number,
                subtask,
                handle.strategy.select_model(complexity),
                gather_prior_results(&task),
                deps_ok,
            )
        };
        let agent = subtask.agent;

        if !deps_ok {
            let e = Error::Validation(format!(
                "dependencies of subtask {} did not complete successfully",
                subtask.id
            ));
            let mut task = handle.state.write().await;
            task.phases[phase_idx].subtasks[subtask_idx].status = SubtaskStatus::Failed;
            task.record_error(TaskError::from_error(
                &e,
                Some(phase_number),
                Some(agent.as_str().to_string()),
            ));
            return SubtaskOutcome::Failed;
        }

        {
            let mut task = handle.state.write().await;
            task.phases[phase_idx].subtasks[subtask_idx].status = SubtaskStatus::Running;
        }

        let mut context: HashMap<String, serde_json::Value> = subtask.input.clone();
        for (key, value) in &prior {
            context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let agent_task = AgentTask {
            task_id,
            phase: phase_number,
            subtask_id: subtask.id,
            description: subtask.description.clone(),
            context,
            model,
            length_policy: handle.config.length_policy,
            cancel: handle.cancel.child_token(),
            events: Arc::clone(&self.events),
        };

        let timeout = Duration::from_millis(handle.config.task_timeout_ms);
        let max_retries = handle.config.max_retries;
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let outcome = self
                .pool
                .run(
                    timeout,
                    handle.cancel.child_token(),
                    self.registry
                        .execute_queued(agent, agent_task.clone(), &prior),
                )
                .await;
            match outcome {
                Ok(result) => break Ok(result),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    let delay = backoff_delay(attempt);
                    debug!(
                        task_id = %task_id,
                        agent = %agent,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying subtask"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(result) if result.success => {
                let mut task = handle.state.write().await;
                task.add_usage(
                    u64::from(result.tokens_in) + u64::from(result.tokens_out),
                    result.cost,
                );
                task.add_files(result.files_modified.clone());
                task.record_result(
                    phase_number,
                    agent,
                    serde_json::Value::Object(result.output.clone()),
                );
                let slot = &mut task.phases[phase_idx].subtasks[subtask_idx];
                slot.status = SubtaskStatus::Completed;
                slot.output = Some(result);
                SubtaskOutcome::Success
            }
            Ok(result) => {
                // Agent-level failure: not retryable
                let message = result.error.clone().unwrap_or_else(|| "agent failed".into());
                let mut task = handle.state.write().await;
                task.add_usage(
                    u64::from(result.tokens_in) + u64::from(result.tokens_out),
                    result.cost,
                );
                task.record_error(TaskError {
                    kind: ErrorKind::Validation,
                    message,
                    phase: Some(phase_number),
                    agent: Some(agent.as_str().to_string()),
                });
                let slot = &mut task.phases[phase_idx].subtasks[subtask_idx];
                slot.status = SubtaskStatus::Failed;
                slot.output = Some(result);
                SubtaskOutcome::Failed
            }
            Err(e) => {
                {
                    let mut task = handle.state.write().await;
                    task.phases[phase_idx].subtasks[subtask_idx].status = SubtaskStatus::Failed;
                    task.record_error(TaskError::from_error(
                        &e,
                        Some(phase_number),
                        Some(agent.as_str().to_string()),
                    ));
                }
                // The agent emits agent.failed itself except when its
                // future was dropped by the pool timeout
                if matches!(e, Error::Timeout(_)) {
                    self.events
                        .publish_task(
                            EventKind::AgentFailed,
                            task_id,
                            serde_json::json!({
                                "agent": agent.as_str(),
                                "phase": phase_number,
                                "subtask_id": subtask.id,
                                "type": e.kind().as_str(),
                                "message": e.to_string(),
                            }),
                        )
                        .await;
                }
                if matches!(e, Error::Cancelled) {
                    SubtaskOutcome::Cancelled
                } else {
                    SubtaskOutcome::Failed
                }
            }
        }
    }

    /// Save a task snapshot once enough events accumulated since the last
    /// one
    async fn maybe_snapshot(&self, handle: &Arc<TaskHandle>) {
        let task = handle.state.read().await;
        let task_id = task.id;
        let store = self.events.store();

        let from_version = match store.get_snapshot(task_id).await {
            Ok(Some(snapshot)) => snapshot.version + 1,
            Ok(None) => 0,
            Err(_) => return,
        };
        let newer = match store.get_events(task_id, from_version).await {
            Ok(events) => events,
            Err(_) => return,
        };
        if (newer.len() as u64) < self.snapshot_interval {
            return;
        }
        let latest = match newer.last() {
            Some(event) => event.version,
            None => return,
        };

        let state = match serde_json::to_value(&*task) {
            Ok(state) => state,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Task snapshot serialization failed");
                return;
            }
        };
        let snapshot = Snapshot::new(task_id, maestro_events::AggregateType::Task, latest, state);
        if let Err(e) = store.save_snapshot(snapshot).await {
            warn!(task_id = %task_id, error = %e, "Task snapshot save failed");
        }
    }
}
