use super::*;
use crate::agent::AgentKind;
use crate::pipeline::EventPipeline;
use crate::task::Complexity;
use maestro_events::{EventBus, EventFilter, EventKind, EventStore, InMemoryEventStore};
use std::sync::Arc;

fn pipeline() -> (Arc<EventPipeline>, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let pipeline = Arc::new(EventPipeline::new(
        Arc::new(EventBus::new()),
        Arc::clone(&store) as Arc<dyn EventStore>,
    ));
    (pipeline, store)
}

#[test]
fn test_mode_parsing() {
    assert_eq!("SPEED".parse::<Mode>().unwrap(), Mode::Speed);
    assert_eq!("quality".parse::<Mode>().unwrap(), Mode::Quality);
    assert!("TURBO".parse::<Mode>().is_err());
}

#[test]
fn test_speed_plan_shape() {
    let strategy = strategy_for(Mode::Speed, ModeConfig::defaults(Mode::Speed));
    let phases = strategy.decompose("fix typo in header");

    assert_eq!(phases.len(), 2);
    assert!(phases[0].parallel);
    assert!(phases[0].required);
    assert_eq!(phases[0].subtasks[0].agent, AgentKind::Implement);
    // Optional verification phase auto-completes unless armed via config
    assert!(!phases[1].required);
    assert!(phases[1].subtasks.is_empty());

    let validation = strategy.validation_config();
    assert!(validation.build);
    assert!(!validation.tests && !validation.typecheck && !validation.lint);
}

#[test]
fn test_quality_plan_shape() {
    let strategy = strategy_for(Mode::Quality, ModeConfig::defaults(Mode::Quality));
    let phases = strategy.decompose("add export button");

    assert_eq!(phases.len(), 4);
    // Design runs concept then architect sequentially
    assert!(!phases[0].parallel);
    assert_eq!(
        phases[0].agent_kinds(),
        vec![AgentKind::Concept, AgentKind::Architect]
    );
    // No translation markers: implementation has a single subtask
    assert_eq!(phases[1].subtasks.len(), 1);
    // Validation runs test/review/security concurrently
    assert!(phases[2].parallel);
    assert_eq!(
        phases[2].agent_kinds(),
        vec![AgentKind::Test, AgentKind::Review, AgentKind::Security]
    );
    assert!(phases.iter().all(|p| p.required));

    let validation = strategy.validation_config();
    assert!(validation.typecheck && validation.lint && validation.build && validation.tests);
    assert!(validation.require_review && validation.require_security_scan);
    assert_eq!(validation.min_coverage, Some(0.80));
}

#[test]
fn test_quality_adds_translations_for_ui_work() {
    let strategy = strategy_for(Mode::Quality, ModeConfig::defaults(Mode::Quality));
    let phases = strategy.decompose("add biorhythm calculator UI with translations");

    let implementation = &phases[1];
    assert_eq!(implementation.subtasks.len(), 2);
    assert_eq!(
        implementation.agent_kinds(),
        vec![AgentKind::Implement, AgentKind::Translate]
    );

    // The marker must be a whole word
    let phases = strategy.decompose("add guidance text");
    assert_eq!(phases[1].subtasks.len(), 1);
}

#[test]
fn test_autonomy_eight_phases() {
    let strategy = strategy_for(Mode::Autonomy, ModeConfig::defaults(Mode::Autonomy));
    let phases = strategy.decompose("migrate storage layer");

    assert_eq!(phases.len(), 8);
    let optional: Vec<&str> = phases
        .iter()
        .filter(|p| !p.required)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(optional, vec!["Optimization"]);
    assert_eq!(phases[7].subtasks[0].agent, AgentKind::Deploy);
}

#[test]
fn test_autonomy_model_by_complexity() {
    let config = ModeConfig::defaults(Mode::Autonomy);
    let strategy = strategy_for(Mode::Autonomy, config.clone());

    assert_eq!(strategy.select_model(Complexity::Complex), config.primary_model);
    // use_local_models is on: simpler work drops to the fallback
    assert_eq!(strategy.select_model(Complexity::Simple), config.fallback_model);
    assert_eq!(strategy.select_model(Complexity::Medium), config.fallback_model);
}

#[test]
fn test_cost_mode_models_and_cap() {
    let config = ModeConfig::defaults(Mode::Cost);
    let strategy = strategy_for(Mode::Cost, config.clone());

    assert_eq!(strategy.select_model(Complexity::Simple).provider, "ollama");
    assert_eq!(strategy.select_model(Complexity::Complex).provider, "anthropic");

    let limit = config.cost_limit.unwrap();
    assert!(strategy.should_continue(maestro_llm::CostMicros::ZERO));
    assert!(!strategy.should_continue(limit));
}

#[tokio::test]
async fn test_switch_mode_publishes_events() {
    let (pipeline, store) = pipeline();
    let manager = ModeManager::new(pipeline, Mode::Speed);

    manager.switch_mode(Mode::Quality).await.unwrap();
    assert_eq!(manager.current().await, Mode::Quality);

    let events = store
        .query(&EventFilter::new().with_kinds(vec![EventKind::ModeSwitching, EventKind::ModeSwitched]))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::ModeSwitching);
    assert_eq!(events[1].kind, EventKind::ModeSwitched);
}

#[tokio::test]
async fn test_switch_to_same_mode_is_noop() {
    let (pipeline, store) = pipeline();
    let manager = ModeManager::new(pipeline, Mode::Speed);

    manager.switch_mode(Mode::Speed).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_update_config_rebuilds_strategy() {
    let (pipeline, store) = pipeline();
    let manager = ModeManager::new(pipeline, Mode::Cost);

    let patch = ModeConfigPatch {
        cost_limit: Some(Some(maestro_llm::CostMicros::from_micros(10_000))),
        max_retries: Some(5),
        ..ModeConfigPatch::default()
    };
    let updated = manager.update_config(Mode::Cost, &patch).await.unwrap();
    assert_eq!(updated.max_retries, 5);
    assert_eq!(updated.cost_limit.unwrap().as_micros(), 10_000);

    // The rebuilt strategy sees the new cap
    let strategy = manager.strategy(Mode::Cost).await;
    assert!(!strategy.should_continue(maestro_llm::CostMicros::from_micros(10_000)));

    let events = store
        .query(&EventFilter::new().with_kinds(vec![EventKind::ModeConfigUpdated]))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn test_patch_merging() {
    let mut config = ModeConfig::defaults(Mode::Speed);
    let patch = ModeConfigPatch {
        requires_human_approval: Some(true),
        task_timeout_ms: Some(1),
        ..ModeConfigPatch::default()
    };
    patch.apply(&mut config);

    assert!(config.requires_human_approval);
    assert_eq!(config.task_timeout_ms, 1);
    // Untouched fields keep their baseline
    assert_eq!(config.max_retries, 1);
}
