//! Provider-backed agent implementation
//!
//! One `LlmAgent` per agent kind: it renders the kind's prompt template
//! over the task description and prior-phase results, calls the selected
//! provider, and reports usage to the cost tracker. Every billable call is
//! recorded, including failed and truncation-retry calls.

use crate::agent::{Agent, AgentCapabilities, AgentKind, AgentTask, ProgressReporter};
use crate::error::{Error, Result};
use crate::modes::LengthPolicy;
use crate::task::AgentResult;
use maestro_events::EventKind;
use maestro_llm::{
    AiProvider, CostTracker, FinishReason, GenerateOptions, Generation, ProviderRegistry,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Cap on prior-result text spliced into prompts
const CONTEXT_EXCERPT_CHARS: usize = 2000;

/// Agent executing subtasks through an AI provider
pub struct LlmAgent {
    kind: AgentKind,
    providers: Arc<ProviderRegistry>,
    tracker: Arc<CostTracker>,
}

impl LlmAgent {
    /// Create an agent for a kind
    #[must_use]
    pub fn new(kind: AgentKind, providers: Arc<ProviderRegistry>, tracker: Arc<CostTracker>) -> Self {
        Self {
            kind,
            providers,
            tracker,
        }
    }

    /// Register an `LlmAgent` for every kind in the closed set
    pub fn register_all(
        registry: &crate::registry::AgentRegistry,
        providers: &Arc<ProviderRegistry>,
        tracker: &Arc<CostTracker>,
    ) -> Result<()> {
        for &kind in AgentKind::ALL {
            registry.register(Arc::new(Self::new(
                kind,
                Arc::clone(providers),
                Arc::clone(tracker),
            )))?;
        }
        Ok(())
    }

    fn excerpt(task: &AgentTask, kind: AgentKind) -> String {
        let text = task
            .prior_result(kind)
            .and_then(|v| v.get("response"))
            .and_then(|v| v.as_str())
            .unwrap_or("N/A");
        text.chars().take(CONTEXT_EXCERPT_CHARS).collect()
    }

    fn prompt(&self, task: &AgentTask) -> String {
        let description = &task.description;
        match self.kind {
            AgentKind::Concept => format!(
                "Analyze this development task and provide a clear breakdown:\n\n\
                 Task: {description}\n\n\
                 Provide:\n\
                 1. Clear requirements list\n\
                 2. User stories (if applicable)\n\
                 3. Acceptance criteria\n\
                 4. Scope boundaries\n\n\
                 Be concise and actionable."
            ),
            AgentKind::Architect => format!(
                "Design the technical architecture for this task:\n\n\
                 Task: {description}\n\n\
                 Previous Analysis:\n{}\n\n\
                 Provide:\n\
                 1. Component diagram (text-based)\n\
                 2. Data flow description\n\
                 3. API contracts (if applicable)\n\
                 4. Technology recommendations\n\n\
                 Be specific about implementation details.",
                Self::excerpt(task, AgentKind::Concept)
            ),
            AgentKind::Implement => format!(
                "Generate production-ready code for this task:\n\n\
                 Task: {description}\n\n\
                 Architecture Context:\n{}\n\n\
                 Requirements:\n\
                 - Follow best practices\n\
                 - Include proper error handling\n\
                 - Add necessary type annotations\n\
                 - Make code testable\n\n\
                 Generate complete, working code.",
                Self::excerpt(task, AgentKind::Architect)
            ),
            AgentKind::Test => format!(
                "Create comprehensive tests for this implementation:\n\n\
                 Task: {description}\n\n\
                 Implementation:\n{}\n\n\
                 Create:\n\
                 1. Unit tests\n\
                 2. Integration tests (if applicable)\n\
                 3. Edge case tests\n\
                 4. Error handling tests",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Verify => format!(
                "Verify that this change does what it claims:\n\n\
                 Task: {description}\n\n\
                 Implementation:\n{}\n\n\
                 State clearly whether the change is correct and list any\n\
                 problems found.",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Review => format!(
                "Review this code for quality and best practices:\n\n\
                 Task: {description}\n\n\
                 Code to Review:\n{}\n\n\
                 Check for:\n\
                 1. Code quality issues\n\
                 2. Performance concerns\n\
                 3. Security vulnerabilities\n\
                 4. Best practice violations\n\n\
                 Provide actionable feedback.",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Security => format!(
                "Perform a security audit on this implementation:\n\n\
                 Task: {description}\n\n\
                 Code to Audit:\n{}\n\n\
                 Check for:\n\
                 1. OWASP Top 10 vulnerabilities\n\
                 2. Input validation issues\n\
                 3. Authentication/Authorization flaws\n\
                 4. Data exposure risks",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Optimize => format!(
                "Optimize this code for performance:\n\n\
                 Task: {description}\n\n\
                 Code to Optimize:\n{}\n\n\
                 Focus on:\n\
                 1. Algorithm efficiency\n\
                 2. Memory usage\n\
                 3. Database queries (if applicable)\n\
                 4. Caching opportunities",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Docs => format!(
                "Generate documentation for this implementation:\n\n\
                 Task: {description}\n\n\
                 Code:\n{}\n\n\
                 Create:\n\
                 1. Function/method documentation\n\
                 2. Usage examples\n\
                 3. API documentation (if applicable)\n\
                 4. README content",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Deploy => format!(
                "Create deployment configuration for this implementation:\n\n\
                 Task: {description}\n\n\
                 Implementation Context:\n{}\n\n\
                 Provide:\n\
                 1. Container configuration (if applicable)\n\
                 2. CI/CD pipeline steps\n\
                 3. Environment variables needed\n\
                 4. Deployment checklist",
                Self::excerpt(task, AgentKind::Implement)
            ),
            AgentKind::Translate => format!(
                "Provide UI translations for this task:\n\n\
                 Task: {description}\n\n\
                 Implementation Context:\n{}\n\n\
                 Produce translation entries for every user-facing string,\n\
                 keyed consistently across languages.",
                Self::excerpt(task, AgentKind::Implement)
            ),
            other => format!("Execute the {other} task for: {description}"),
        }
    }

    async fn call(
        &self,
        provider: &Arc<dyn AiProvider>,
        prompt: &str,
        opts: &GenerateOptions,
        task: &AgentTask,
    ) -> Result<Generation> {
        if task.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            () = task.cancel.cancelled() => Err(Error::Cancelled),
            result = provider.generate(prompt, opts) => result.map_err(Error::from),
        };
        let latency = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(generation) => {
                let record = self
                    .tracker
                    .record_usage(
                        provider.name(),
                        &generation.model,
                        generation.tokens_in,
                        generation.tokens_out,
                        latency,
                        true,
                        Some(task.task_id),
                    )
                    .await;
                task.events
                    .publish_task(
                        EventKind::CostIncurred,
                        task.task_id,
                        serde_json::json!({
                            "agent": self.kind.as_str(),
                            "provider": provider.name(),
                            "model": generation.model,
                            "tokens_in": generation.tokens_in,
                            "tokens_out": generation.tokens_out,
                            "cost_micros": record.cost.as_micros(),
                        }),
                    )
                    .await;
                Ok(generation)
            }
            Err(e) => {
                if !matches!(e, Error::Cancelled) {
                    self.tracker
                        .record_usage(
                            provider.name(),
                            opts.model.as_deref().unwrap_or(provider.default_model()),
                            0,
                            0,
                            latency,
                            false,
                            Some(task.task_id),
                        )
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn run(&self, task: &AgentTask, progress: &ProgressReporter) -> Result<AgentResult> {
        let started = Instant::now();
        let provider = self.providers.get(&task.model.provider).ok_or_else(|| {
            Error::Provider(format!("provider not registered: {}", task.model.provider))
        })?;

        let prompt = self.prompt(task);
        let opts = GenerateOptions::new()
            .with_model(task.model.model.clone())
            .with_temperature(task.model.temperature)
            .with_max_tokens(task.model.max_tokens)
            .with_system_prompt("You are an AI agent specialized in software development.");

        let mut generation = self.call(&provider, &prompt, &opts, task).await?;
        let mut tokens_in = generation.tokens_in;
        let mut tokens_out = generation.tokens_out;
        let mut cost = self
            .tracker
            .estimate_cost(&generation.model, generation.tokens_in, generation.tokens_out)
            .await;
        progress.report(60, "generation finished").await;

        let mut truncated = false;
        if generation.finish_reason == FinishReason::Length {
            match task.length_policy {
                LengthPolicy::AcceptTruncated => truncated = true,
                LengthPolicy::RetryLarger => {
                    let ceiling = provider.max_output_tokens(&task.model.model);
                    let larger = task.model.max_tokens.saturating_mul(2).min(ceiling);
                    debug!(agent = %self.kind, max_tokens = larger, "Retrying truncated generation");

                    let retry_opts = opts.clone().with_max_tokens(larger);
                    let retry = self.call(&provider, &prompt, &retry_opts, task).await?;
                    tokens_in += retry.tokens_in;
                    tokens_out += retry.tokens_out;
                    cost = cost.saturating_add(
                        self.tracker
                            .estimate_cost(&retry.model, retry.tokens_in, retry.tokens_out)
                            .await,
                    );
                    truncated = retry.finish_reason == FinishReason::Length;
                    generation = retry;
                }
            }
        }

        if generation.finish_reason == FinishReason::Error {
            return Err(Error::Provider("provider reported an error finish".into()));
        }

        let mut output = serde_json::Map::new();
        output.insert("response".into(), serde_json::json!(generation.content));
        output.insert("model".into(), serde_json::json!(generation.model));
        if truncated {
            output.insert("truncated".into(), serde_json::json!(true));
        }

        Ok(AgentResult::success(output)
            .with_usage(tokens_in, tokens_out, cost)
            .with_duration(started.elapsed().as_millis() as u64))
    }
}

#[async_trait::async_trait]
impl Agent for LlmAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn capabilities(&self) -> AgentCapabilities {
        let (description, estimated_duration_ms) = match self.kind {
            AgentKind::Concept => ("Requirements analysis and scoping", 30_000),
            AgentKind::Architect => ("Technical architecture design", 45_000),
            AgentKind::Implement => ("Production code generation", 90_000),
            AgentKind::Test => ("Test suite authoring", 60_000),
            AgentKind::Verify => ("Lightweight change verification", 20_000),
            AgentKind::Review => ("Code review", 45_000),
            AgentKind::Optimize => ("Performance optimization", 60_000),
            AgentKind::Docs => ("Documentation generation", 30_000),
            AgentKind::Deploy => ("Deployment configuration", 30_000),
            AgentKind::Security => ("Security audit", 45_000),
            AgentKind::Refactor => ("Code restructuring", 90_000),
            AgentKind::Debug => ("Defect diagnosis", 60_000),
            AgentKind::Migrate => ("Migration work", 120_000),
            AgentKind::Translate => ("UI translation", 30_000),
            AgentKind::PythonExpert
            | AgentKind::TypescriptExpert
            | AgentKind::RustExpert => ("Language-specific implementation", 90_000),
        };

        let required_context: Vec<String> = crate::registry::dependencies(self.kind)
            .iter()
            .map(|dep| dep.result_key())
            .collect();

        AgentCapabilities {
            name: self.kind.to_string(),
            description: description.to_string(),
            capabilities: vec![self.kind.to_string()],
            inputs: vec!["description".to_string()],
            outputs: vec!["response".to_string()],
            required_context,
            estimated_duration_ms,
        }
    }

    #[instrument(skip(self, task), fields(agent = %self.kind, task_id = %task.task_id))]
    async fn execute(&self, task: AgentTask) -> Result<AgentResult> {
        task.events
            .publish_task(
                EventKind::AgentStarted,
                task.task_id,
                serde_json::json!({
                    "agent": self.kind.as_str(),
                    "phase": task.phase,
                    "subtask_id": task.subtask_id,
                }),
            )
            .await;

        let progress = ProgressReporter::new(Arc::clone(&task.events), task.task_id, self.kind);
        progress.report(0, "starting").await;

        match self.run(&task, &progress).await {
            Ok(result) => {
                progress.report(100, "finished").await;
                task.events
                    .publish_task(
                        EventKind::AgentCompleted,
                        task.task_id,
                        serde_json::json!({
                            "agent": self.kind.as_str(),
                            "phase": task.phase,
                            "subtask_id": task.subtask_id,
                            "duration_ms": result.duration_ms,
                            "tokens_in": result.tokens_in,
                            "tokens_out": result.tokens_out,
                            "cost_micros": result.cost.as_micros(),
                        }),
                    )
                    .await;
                Ok(result)
            }
            Err(e) => {
                warn!(agent = %self.kind, error = %e, "Agent execution failed");
                task.events
                    .publish_task(
                        EventKind::AgentFailed,
                        task.task_id,
                        serde_json::json!({
                            "agent": self.kind.as_str(),
                            "phase": task.phase,
                            "subtask_id": task.subtask_id,
                            "type": e.kind().as_str(),
                            "message": e.to_string(),
                        }),
                    )
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EventPipeline;
    use maestro_events::{EventBus, EventFilter, EventStore, InMemoryEventStore};
    use maestro_llm::{MockOutcome, MockProvider};
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn setup(mock: MockProvider) -> (Arc<ProviderRegistry>, Arc<CostTracker>, Arc<EventPipeline>, Arc<InMemoryEventStore>) {
        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(mock)).unwrap();
        let store = Arc::new(InMemoryEventStore::new());
        let pipeline = Arc::new(EventPipeline::new(
            Arc::new(EventBus::new()),
            Arc::clone(&store) as Arc<dyn EventStore>,
        ));
        (Arc::new(providers), Arc::new(CostTracker::new()), pipeline, store)
    }

    fn agent_task(events: Arc<EventPipeline>, policy: LengthPolicy) -> AgentTask {
        AgentTask {
            task_id: Uuid::new_v4(),
            phase: 1,
            subtask_id: Uuid::new_v4(),
            description: "add a parser".into(),
            context: HashMap::new(),
            model: crate::modes::ModelSpec::new("mock", "claude-3-5-sonnet-20241022"),
            length_policy: policy,
            cancel: CancellationToken::new(),
            events,
        }
    }

    #[tokio::test]
    async fn test_successful_execution_emits_lifecycle_events() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::success_with_tokens("the code", 1000, 500));
        let (providers, tracker, pipeline, store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Implement, providers, Arc::clone(&tracker));
        let task = agent_task(pipeline, LengthPolicy::AcceptTruncated);
        let task_id = task.task_id;

        let result = agent.execute(task).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output["response"], "the code");
        assert_eq!(result.tokens_in, 1000);
        assert_eq!(result.tokens_out, 500);
        // 1000 in + 500 out on sonnet pricing: 0.003 + 0.0075
        assert_eq!(result.cost.as_micros(), 10_500);

        let events = store.get_events(task_id, 0).await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::AgentStarted));
        assert!(kinds.contains(&EventKind::CostIncurred));
        assert!(kinds.contains(&EventKind::AgentCompleted));
        assert!(!kinds.contains(&EventKind::AgentFailed));
    }

    #[tokio::test]
    async fn test_failure_emits_agent_failed_with_type() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::Failure(maestro_llm::MockFailure::Api("bad".into())));
        let (providers, tracker, pipeline, store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Test, providers, tracker);
        let task = agent_task(pipeline, LengthPolicy::AcceptTruncated);
        let task_id = task.task_id;

        let err = agent.execute(task).await.unwrap_err();
        assert!(err.is_retryable());

        let failed = store
            .query(&EventFilter::new()
                .with_aggregate(task_id)
                .with_kinds(vec![EventKind::AgentFailed]))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].data["type"], "provider");
    }

    #[tokio::test]
    async fn test_cancellation_surfaces_as_cancelled() {
        let mock = MockProvider::named("mock").with_delay(std::time::Duration::from_secs(5));
        let (providers, tracker, pipeline, store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Implement, providers, tracker);
        let task = agent_task(pipeline, LengthPolicy::AcceptTruncated);
        let task_id = task.task_id;
        let cancel = task.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = agent.execute(task).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let failed = store
            .query(&EventFilter::new()
                .with_aggregate(task_id)
                .with_kinds(vec![EventKind::AgentFailed]))
            .await
            .unwrap();
        assert_eq!(failed[0].data["type"], "cancelled");
    }

    #[tokio::test]
    async fn test_accept_truncated_marks_output() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::truncated("partial out"));
        let (providers, tracker, pipeline, _store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Implement, providers, tracker);
        let result = agent
            .execute(agent_task(pipeline, LengthPolicy::AcceptTruncated))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output["truncated"], true);
    }

    #[tokio::test]
    async fn test_retry_larger_makes_second_call() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::truncated("partial"));
        mock.queue(MockOutcome::success_with_tokens("full output", 100, 400));
        let (providers, tracker, pipeline, _store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Implement, Arc::clone(&providers), Arc::clone(&tracker));
        let result = agent
            .execute(agent_task(pipeline, LengthPolicy::RetryLarger))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output["response"], "full output");
        assert!(result.output.get("truncated").is_none());
        // Both calls count: 100+100 in, 200+400 out
        assert_eq!(result.tokens_in, 200);
        assert_eq!(result.tokens_out, 600);

        let stats = tracker.stats(None).await;
        assert_eq!(stats.total_requests, 2);
    }

    #[tokio::test]
    async fn test_failed_call_still_recorded() {
        let mock = MockProvider::named("mock");
        mock.queue(MockOutcome::Failure(maestro_llm::MockFailure::RateLimit));
        let (providers, tracker, pipeline, _store) = setup(mock);

        let agent = LlmAgent::new(AgentKind::Implement, providers, Arc::clone(&tracker));
        let _ = agent
            .execute(agent_task(pipeline, LengthPolicy::AcceptTruncated))
            .await;

        let stats = tracker.stats(None).await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
    }
}
