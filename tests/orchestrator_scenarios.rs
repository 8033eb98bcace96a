//! End-to-end orchestrator scenarios against scripted providers.

use maestro_core::{
    App, AppConfig, Mode, ModeConfigPatch, ModelSpec, PhaseStatus, SubmitRequest, TaskStatus,
};
use maestro_events::{EventFilter, EventKind};
use maestro_llm::{CostMicros, MockFailure, MockOutcome, MockProvider, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    app: Arc<App>,
    anthropic: Arc<MockProvider>,
    ollama: Arc<MockProvider>,
}

async fn harness(default_mode: Mode, delay: Option<Duration>) -> Harness {
    let mut anthropic = MockProvider::named("anthropic");
    let mut ollama = MockProvider::named("ollama").with_default_model("codellama:7b");
    if let Some(delay) = delay {
        anthropic = anthropic.with_delay(delay);
        ollama = ollama.with_delay(delay);
    }
    let anthropic = Arc::new(anthropic);
    let ollama = Arc::new(ollama);

    let mut providers = ProviderRegistry::new();
    providers
        .register(Arc::clone(&anthropic) as Arc<dyn maestro_llm::AiProvider>)
        .unwrap();
    providers
        .register(Arc::clone(&ollama) as Arc<dyn maestro_llm::AiProvider>)
        .unwrap();

    let config = AppConfig {
        default_mode,
        ..AppConfig::default()
    };
    let app = App::new(config, providers).await.unwrap();
    Harness {
        app,
        anthropic,
        ollama,
    }
}

async fn event_kinds(app: &App, task_id: Uuid) -> Vec<EventKind> {
    app.store()
        .query(&EventFilter::new().with_aggregate(task_id))
        .await
        .unwrap()
        .iter()
        .map(|e| e.kind)
        .collect()
}

/// Scenario 1: SPEED mode, simple fix. Two phases, the second empty and
/// auto-completing, with exactly the specified lifecycle event order.
#[tokio::test]
async fn speed_simple_fix() {
    let h = harness(Mode::Speed, None).await;
    h.anthropic.queue(MockOutcome::success("patched"));

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("fix typo in header").with_mode(Mode::Speed))
        .await
        .unwrap();
    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.phases.len(), 2);
    assert_eq!(task.phases[0].status, PhaseStatus::Completed);
    assert_eq!(task.phases[1].status, PhaseStatus::Completed);

    let events = h
        .app
        .store()
        .query(&EventFilter::new().with_aggregate(id))
        .await
        .unwrap();

    // Versions are strictly monotonic for the task
    for pair in events.windows(2) {
        assert!(pair[1].version > pair[0].version);
    }

    let lifecycle: Vec<EventKind> = events
        .iter()
        .map(|e| e.kind)
        .filter(|k| !matches!(k, EventKind::AgentProgress | EventKind::CostIncurred))
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            EventKind::TaskCreated,
            EventKind::TaskStarted,
            EventKind::PhaseStarted,
            EventKind::AgentStarted,
            EventKind::AgentCompleted,
            EventKind::PhaseCompleted,
            EventKind::PhaseStarted,
            EventKind::PhaseCompleted,
            EventKind::TaskCompleted,
        ]
    );
}

/// Scenario 2: QUALITY mode, medium UI feature with translations. Phase 2
/// carries two parallel implementation subtasks; phase 3 runs test,
/// review, and security concurrently; every phase is required and must
/// complete.
#[tokio::test]
async fn quality_ui_feature_with_translations() {
    let h = harness(Mode::Quality, None).await;

    let id = h
        .app
        .orchestrator()
        .submit(
            SubmitRequest::new("add biorhythm calculator UI with translations")
                .with_mode(Mode::Quality),
        )
        .await
        .unwrap();
    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.phases.len(), 4);
    assert!(task.phases.iter().all(|p| p.required));
    assert!(task
        .phases
        .iter()
        .all(|p| p.status == PhaseStatus::Completed));

    let implementation = &task.phases[1];
    assert!(implementation.parallel);
    assert_eq!(implementation.subtasks.len(), 2);
    let agents: Vec<&str> = implementation
        .subtasks
        .iter()
        .map(|s| s.agent.as_str())
        .collect();
    assert!(agents.contains(&"implement"));
    assert!(agents.contains(&"translate"));

    let validation_phase = &task.phases[2];
    assert!(validation_phase.parallel);
    let validators: Vec<&str> = validation_phase
        .subtasks
        .iter()
        .map(|s| s.agent.as_str())
        .collect();
    assert_eq!(validators, vec!["test", "review", "security"]);

    // The mode's validation profile requires the full gate set
    let strategy = h.app.modes().strategy(Mode::Quality).await;
    let gates = strategy.validation_config();
    assert!(gates.typecheck && gates.lint && gates.build && gates.tests);
    assert!(gates.require_review && gates.require_security_scan);
    assert_eq!(gates.min_coverage, Some(0.80));

    // One agent call per subtask across the four phases
    assert_eq!(h.anthropic.call_count(), 8);
}

/// Scenario 3: AUTONOMY mode, complex refactor whose test subtask fails
/// twice and succeeds on the third attempt. A retry budget of 5 absorbs
/// the failures; a budget of 1 does not.
#[tokio::test]
async fn autonomy_retry_budgets() {
    // Generous budget: the third attempt lands
    let h = harness(Mode::Autonomy, None).await;
    h.app
        .modes()
        .update_config(
            Mode::Autonomy,
            &ModeConfigPatch {
                max_retries: Some(5),
                ..ModeConfigPatch::default()
            },
        )
        .await
        .unwrap();
    h.anthropic.queue_all([
        MockOutcome::success("analysis"),
        MockOutcome::success("architecture"),
        MockOutcome::success("implementation"),
        MockOutcome::Failure(MockFailure::Api("flaky test run".into())),
        MockOutcome::Failure(MockFailure::Api("flaky test run".into())),
        MockOutcome::success("tests pass"),
    ]);

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("refactor the payment module"))
        .await
        .unwrap();
    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.phases.len(), 8);

    // Tight budget: two attempts, both fail
    let h = harness(Mode::Autonomy, None).await;
    h.app
        .modes()
        .update_config(
            Mode::Autonomy,
            &ModeConfigPatch {
                max_retries: Some(1),
                ..ModeConfigPatch::default()
            },
        )
        .await
        .unwrap();
    h.anthropic.queue_all([
        MockOutcome::success("analysis"),
        MockOutcome::success("architecture"),
        MockOutcome::success("implementation"),
        MockOutcome::Failure(MockFailure::Api("flaky test run".into())),
        MockOutcome::Failure(MockFailure::Api("flaky test run".into())),
    ]);

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("refactor the payment module"))
        .await
        .unwrap();
    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.errors.len(), 1);
    let error = &task.errors[0];
    assert_eq!(serde_json::to_value(error.kind).unwrap(), "provider");
    assert_eq!(error.phase, Some(4));
    assert_eq!(error.agent.as_deref(), Some("test"));
}

/// Scenario 4: COST mode with a $0.01 cap on a cloud model. The first
/// call costs $0.036, so the task fails with cost_exceeded after exactly
/// one cost.limit.reached event and no further subtasks.
#[tokio::test]
async fn cost_cap_exceeded() {
    let h = harness(Mode::Cost, None).await;
    h.app
        .modes()
        .update_config(
            Mode::Cost,
            &ModeConfigPatch {
                primary_model: Some(ModelSpec::new("anthropic", "claude-3-5-sonnet-20241022")),
                fallback_model: Some(ModelSpec::new("anthropic", "claude-3-5-sonnet-20241022")),
                cost_limit: Some(Some(CostMicros::from_micros(10_000))),
                ..ModeConfigPatch::default()
            },
        )
        .await
        .unwrap();
    h.anthropic
        .queue(MockOutcome::success_with_tokens("expensive output", 2000, 2000));

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("fix the cheapest possible thing"))
        .await
        .unwrap();
    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    // (2000/1000)*0.003 + (2000/1000)*0.015 = 0.036
    assert_eq!(task.cost.as_micros(), 36_000);
    assert!(task
        .errors
        .iter()
        .any(|e| serde_json::to_value(e.kind).unwrap() == "cost_exceeded"));

    let kinds = event_kinds(&h.app, id).await;
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == EventKind::CostLimitReached)
            .count(),
        1
    );
    // Only the first phase ever started
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == EventKind::PhaseStarted)
            .count(),
        1
    );
    assert_eq!(h.anthropic.call_count(), 1);
    assert_eq!(h.ollama.call_count(), 0);
}

/// Scenario 5: switching modes mid-flight never affects an in-progress
/// task; only later submissions pick up the new mode.
#[tokio::test]
async fn mode_switch_mid_flight() {
    let h = harness(Mode::Speed, Some(Duration::from_millis(150))).await;

    let t1 = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("fix login button"))
        .await
        .unwrap();

    // Switch while T1 is still executing
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.app.modes().switch_mode(Mode::Quality).await.unwrap();

    let t1 = h
        .app
        .orchestrator()
        .wait(t1, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(t1.status, TaskStatus::Completed);
    assert_eq!(t1.mode, Mode::Speed);
    assert_eq!(t1.phases.len(), 2);

    let t2 = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("fix login button"))
        .await
        .unwrap();
    let t2 = h
        .app
        .orchestrator()
        .wait(t2, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(t2.mode, Mode::Quality);
    assert_eq!(t2.phases.len(), 4);
}

/// Scenario 6: cancelling a QUALITY task during phase 2. The task reaches
/// cancelled promptly, no later phase starts, and the interrupted subtask
/// reports an agent failure of type cancelled.
#[tokio::test]
async fn cancellation_during_phase_two() {
    let h = harness(Mode::Quality, Some(Duration::from_millis(300))).await;

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("add an export feature"))
        .await
        .unwrap();

    // Wait for phase 2 (index 1) to be running
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = h.app.orchestrator().get(id).await.unwrap();
        if task.status == TaskStatus::Running
            && task.phases.len() == 4
            && task.phases[1].status == PhaseStatus::Running
        {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "phase 2 never started"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.app.orchestrator().cancel(id).await.unwrap();
    // Cancel is idempotent
    h.app.orchestrator().cancel(id).await.unwrap();

    let task = h
        .app
        .orchestrator()
        .wait(id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);

    // No phase after the cancel point ever ran
    assert_eq!(task.phases[2].status, PhaseStatus::Pending);
    assert_eq!(task.phases[3].status, PhaseStatus::Pending);

    let events = h
        .app
        .store()
        .query(&EventFilter::new().with_aggregate(id))
        .await
        .unwrap();

    let failed: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::AgentFailed)
        .collect();
    assert!(!failed.is_empty());
    for event in &failed {
        assert_eq!(event.data["type"], "cancelled");
    }

    // Exactly one task.cancelled despite the double cancel
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::TaskCancelled)
            .count(),
        1
    );
}

/// Fan-out subscribers see the task's lifecycle on its channel.
#[tokio::test]
async fn subscription_stream_follows_task() {
    let h = harness(Mode::Speed, None).await;

    let mut handle = h
        .app
        .orchestrator()
        .subscribe(vec!["tasks".to_string()])
        .await;

    let id = h
        .app
        .orchestrator()
        .submit(SubmitRequest::new("fix a broken link"))
        .await
        .unwrap();
    h.app
        .orchestrator()
        .wait(id, Duration::from_secs(10))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(message) = handle.receiver.try_recv() {
        assert_eq!(message.task_id, Some(id));
        seen.push(message.message_type);
    }
    assert!(seen.contains(&"task.created".to_string()));
    assert!(seen.contains(&"task.completed".to_string()));
}
