//! Agent registry
//!
//! Owns agent instances, the inter-agent dependency mapping, and the
//! concurrency cap. Execution levels come from a topological sort over the
//! closed dependency map; the active set is mutated only at execution
//! entry/exit under the registry lock.

use crate::agent::{Agent, AgentCapabilities, AgentKind, AgentTask};
use crate::error::{Error, Result};
use crate::task::AgentResult;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Default concurrency cap
pub const DEFAULT_CAP: usize = 4;

/// Default wait for a slot in [`AgentRegistry::execute_parallel`]
const DEFAULT_SLOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Inter-agent dependencies: which kinds must have produced results before
/// a kind may run. This mapping is closed; kinds not listed have none.
#[must_use]
pub fn dependencies(kind: AgentKind) -> &'static [AgentKind] {
    match kind {
        AgentKind::Architect => &[AgentKind::Concept],
        AgentKind::Implement => &[AgentKind::Architect],
        AgentKind::Test | AgentKind::Review | AgentKind::Security | AgentKind::Docs => {
            &[AgentKind::Implement]
        }
        AgentKind::Optimize => &[AgentKind::Implement, AgentKind::Test],
        AgentKind::Deploy => &[AgentKind::Test, AgentKind::Review],
        _ => &[],
    }
}

struct Inner {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
    active: HashMap<AgentKind, usize>,
}

/// Decrements the active count for a kind when execution ends, including
/// when the executing future is dropped by a timeout.
struct ActiveGuard {
    inner: Arc<Mutex<Inner>>,
    kind: AgentKind,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(count) = inner.active.get_mut(&self.kind) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

/// Registry of agents with dependency resolution and a concurrency cap
pub struct AgentRegistry {
    inner: Arc<Mutex<Inner>>,
    semaphore: Arc<Semaphore>,
    cap: usize,
    slot_timeout: Duration,
}

impl AgentRegistry {
    /// Create a registry with the given concurrency cap
    #[must_use]
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                agents: HashMap::new(),
                active: HashMap::new(),
            })),
            semaphore: Arc::new(Semaphore::new(cap)),
            cap,
            slot_timeout: DEFAULT_SLOT_TIMEOUT,
        }
    }

    /// Override the parallel-execution slot timeout
    #[must_use]
    pub fn with_slot_timeout(mut self, timeout: Duration) -> Self {
        self.slot_timeout = timeout;
        self
    }

    /// The concurrency cap
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of executions currently in flight
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.active.values().sum())
    }

    /// Register an agent. Duplicate kinds are rejected.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let kind = agent.kind();
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))?;
        if inner.agents.contains_key(&kind) {
            return Err(Error::Conflict(format!("agent already registered: {kind}")));
        }
        inner.agents.insert(kind, agent);
        Ok(())
    }

    /// Remove an agent. Rejected while the kind has executions in flight.
    pub fn unregister(&self, kind: AgentKind) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))?;
        if inner.active.get(&kind).copied().unwrap_or(0) > 0 {
            return Err(Error::Conflict(format!("agent active: {kind}")));
        }
        if inner.agents.remove(&kind).is_none() {
            return Err(Error::NotFound(format!("agent {kind}")));
        }
        Ok(())
    }

    /// Look up an agent
    #[must_use]
    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.inner.lock().ok()?.agents.get(&kind).cloned()
    }

    /// Registered kinds, unordered
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<AgentKind> {
        self.inner
            .lock()
            .map_or_else(|_| Vec::new(), |inner| inner.agents.keys().copied().collect())
    }

    /// Capabilities of every registered agent
    #[must_use]
    pub fn capabilities(&self) -> HashMap<AgentKind, AgentCapabilities> {
        self.inner.lock().map_or_else(
            |_| HashMap::new(),
            |inner| {
                inner
                    .agents
                    .iter()
                    .map(|(kind, agent)| (*kind, agent.capabilities()))
                    .collect()
            },
        )
    }

    /// Topological execution levels for a set of kinds.
    ///
    /// Dependency edges are restricted to the given set (a dependency that
    /// ran in an earlier phase is not re-required here). Every kind must be
    /// registered; a cycle or an unregistered kind is `unresolvable`.
    pub fn execution_order(&self, required: &[AgentKind]) -> Result<Vec<Vec<AgentKind>>> {
        let mut kinds: Vec<AgentKind> = Vec::new();
        for &kind in required {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        {
            let inner = self
                .inner
                .lock()
                .map_err(|_| Error::Internal("registry lock poisoned".into()))?;
            for kind in &kinds {
                if !inner.agents.contains_key(kind) {
                    return Err(Error::Unresolvable(format!("agent not registered: {kind}")));
                }
            }
        }

        let mut remaining = kinds.clone();
        let mut placed: Vec<AgentKind> = Vec::new();
        let mut levels: Vec<Vec<AgentKind>> = Vec::new();

        while !remaining.is_empty() {
            let level: Vec<AgentKind> = remaining
                .iter()
                .filter(|kind| {
                    dependencies(**kind)
                        .iter()
                        .filter(|dep| kinds.contains(dep))
                        .all(|dep| placed.contains(dep))
                })
                .copied()
                .collect();

            if level.is_empty() {
                return Err(Error::Unresolvable(format!(
                    "cyclic dependency among: {}",
                    remaining
                        .iter()
                        .map(AgentKind::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }

            remaining.retain(|kind| !level.contains(kind));
            placed.extend(&level);
            levels.push(level);
        }

        Ok(levels)
    }

    fn mark_active(&self, kind: AgentKind, reentrant: bool) -> Result<ActiveGuard> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))?;
        if !inner.agents.contains_key(&kind) {
            return Err(Error::NotFound(format!("agent {kind}")));
        }
        let count = inner.active.entry(kind).or_insert(0);
        if !reentrant && *count > 0 {
            return Err(Error::Conflict(format!("agent already executing: {kind}")));
        }
        *count += 1;
        Ok(ActiveGuard {
            inner: Arc::clone(&self.inner),
            kind,
        })
    }

    async fn run_guarded(
        &self,
        kind: AgentKind,
        mut task: AgentTask,
        prior_results: &HashMap<String, serde_json::Value>,
        reentrant: bool,
    ) -> Result<AgentResult> {
        let agent = self
            .get(kind)
            .ok_or_else(|| Error::NotFound(format!("agent {kind}")))?;
        let _guard = self.mark_active(kind, reentrant)?;

        for (key, value) in prior_results {
            task.context.entry(key.clone()).or_insert_with(|| value.clone());
        }

        debug!(agent = %kind, task_id = %task.task_id, "Executing agent");
        let result = agent.execute(task).await?;

        let verdict = agent.validate(&result);
        if !verdict.ok {
            return Ok(AgentResult::failure(format!(
                "validation failed: {}",
                verdict.errors.join(", ")
            ))
            .with_usage(result.tokens_in, result.tokens_out, result.cost)
            .with_duration(result.duration_ms));
        }
        Ok(result)
    }

    /// Execute one agent with prior results injected into its context.
    ///
    /// Rejects with `conflict` when the concurrency cap is reached or the
    /// kind is already executing (this entry point is not reentrant).
    pub async fn execute_with_dependencies(
        &self,
        kind: AgentKind,
        task: AgentTask,
        prior_results: &HashMap<String, serde_json::Value>,
    ) -> Result<AgentResult> {
        let _permit = self
            .semaphore
            .try_acquire()
            .map_err(|_| Error::Conflict("agent concurrency cap reached".into()))?;
        self.run_guarded(kind, task, prior_results, false).await
    }

    /// Execute one agent, waiting FIFO for a free slot.
    ///
    /// This is the scheduler path: same-kind executions may run
    /// concurrently (parallel subtasks with identical agent types are not
    /// deduped).
    pub async fn execute_queued(
        &self,
        kind: AgentKind,
        task: AgentTask,
        prior_results: &HashMap<String, serde_json::Value>,
    ) -> Result<AgentResult> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Internal("registry semaphore closed".into()))?;
        self.run_guarded(kind, task, prior_results, true).await
    }

    /// Execute several kinds concurrently, bounded by the free slots.
    ///
    /// Never blocks past the slot timeout: kinds that cannot get a slot in
    /// time come back as failed results rather than queueing forever.
    pub async fn execute_parallel(
        &self,
        kinds: &[AgentKind],
        task: &AgentTask,
        prior_results: &HashMap<String, serde_json::Value>,
    ) -> HashMap<AgentKind, AgentResult> {
        let futures = kinds.iter().map(|&kind| {
            let task = task.clone();
            async move {
                let acquired =
                    tokio::time::timeout(self.slot_timeout, self.semaphore.acquire()).await;
                let result = match acquired {
                    Ok(Ok(_permit)) => {
                        match self.run_guarded(kind, task, prior_results, true).await {
                            Ok(result) => result,
                            Err(e) => AgentResult::failure(e.to_string()),
                        }
                    }
                    Ok(Err(_)) => AgentResult::failure("registry semaphore closed"),
                    Err(_) => AgentResult::failure(format!(
                        "no execution slot within {}ms",
                        self.slot_timeout.as_millis()
                    )),
                };
                (kind, result)
            }
        });
        join_all(futures).await.into_iter().collect()
    }
}
