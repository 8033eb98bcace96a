//! Application context
//!
//! Owns every long-lived value: bus, store, providers, cost tracker, mode
//! manager, agent registry, projects, and the orchestrator. Constructed
//! once at startup and passed explicitly; there is no module-level global.
//! Shutdown stops intake, cancels active tasks, drains, and closes the
//! fan-out subscriptions.

use crate::config::AppConfig;
use crate::error::Result;
use crate::fanout::SubscriptionManager;
use crate::llm_agent::LlmAgent;
use crate::modes::ModeManager;
use crate::orchestrator::Orchestrator;
use crate::pipeline::EventPipeline;
use crate::pool::WorkerPool;
use crate::project::ProjectRegistry;
use crate::registry::AgentRegistry;
use crate::shutdown::ShutdownController;
use maestro_events::{
    AggregateType, EventBus, EventKind, EventStore, InMemoryEventStore,
};
use maestro_llm::{
    AnthropicProvider, CostTracker, OllamaProvider, ProviderHealth, ProviderRegistry,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Aggregated health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `"ok"` when every provider is healthy, `"degraded"` otherwise
    pub status: String,
    /// Event store backend name
    pub store: String,
    /// Per-provider health
    pub providers: HashMap<String, ProviderHealth>,
}

/// Long-lived application context
pub struct App {
    config: AppConfig,
    bus: Arc<EventBus>,
    store: Arc<dyn EventStore>,
    pipeline: Arc<EventPipeline>,
    providers: Arc<ProviderRegistry>,
    cost_tracker: Arc<CostTracker>,
    modes: Arc<ModeManager>,
    agents: Arc<AgentRegistry>,
    projects: Arc<ProjectRegistry>,
    orchestrator: Arc<Orchestrator>,
    fanout: Arc<SubscriptionManager>,
    shutdown: Arc<ShutdownController>,
}

impl App {
    /// Build an app over an in-memory event store
    pub async fn new(config: AppConfig, providers: ProviderRegistry) -> Result<Arc<Self>> {
        Self::with_store(config, providers, Arc::new(InMemoryEventStore::new())).await
    }

    /// Build an app over a custom event store
    pub async fn with_store(
        config: AppConfig,
        providers: ProviderRegistry,
        store: Arc<dyn EventStore>,
    ) -> Result<Arc<Self>> {
        let bus = Arc::new(EventBus::new());
        let pipeline = Arc::new(EventPipeline::new(Arc::clone(&bus), Arc::clone(&store)));

        let fanout = Arc::new(SubscriptionManager::with_buffer(config.fanout_buffer));
        fanout.attach(&bus).await?;

        let providers = Arc::new(providers);
        let cost_tracker = Arc::new(CostTracker::new());
        let modes = Arc::new(ModeManager::new(Arc::clone(&pipeline), config.default_mode));

        let agents = Arc::new(AgentRegistry::new(config.agent_cap));
        LlmAgent::register_all(&agents, &providers, &cost_tracker)?;

        let shutdown = ShutdownController::new();
        let orchestrator = Arc::new(
            Orchestrator::new(
                Arc::clone(&pipeline),
                Arc::clone(&modes),
                Arc::clone(&agents),
                Arc::new(WorkerPool::new(config.max_workers)),
                Arc::clone(&fanout),
            )
            .with_snapshot_interval(config.snapshot_interval)
            .with_shutdown_controller(Arc::clone(&shutdown)),
        );
        orchestrator.start();

        pipeline
            .publish(
                EventKind::SystemStarted,
                Uuid::nil(),
                AggregateType::Execution,
                serde_json::json!({"mode": config.default_mode}),
            )
            .await;
        info!(mode = %config.default_mode, workers = config.max_workers, "Maestro started");

        Ok(Arc::new(Self {
            config,
            bus,
            store,
            pipeline,
            providers,
            cost_tracker,
            modes,
            agents,
            projects: Arc::new(ProjectRegistry::new()),
            orchestrator,
            fanout,
            shutdown,
        }))
    }

    /// Build a provider registry from environment variables: Anthropic
    /// when an API key is set, and the local Ollama daemon.
    #[must_use]
    pub fn providers_from_env() -> ProviderRegistry {
        let mut providers = ProviderRegistry::new();
        match AnthropicProvider::from_env() {
            Ok(provider) => {
                if let Err(e) = providers.register(Arc::new(provider)) {
                    warn!(error = %e, "Anthropic provider registration failed");
                }
            }
            Err(e) => warn!(error = %e, "Anthropic provider unavailable"),
        }
        match OllamaProvider::from_env() {
            Ok(provider) => {
                if let Err(e) = providers.register(Arc::new(provider)) {
                    warn!(error = %e, "Ollama provider registration failed");
                }
            }
            Err(e) => warn!(error = %e, "Ollama provider unavailable"),
        }
        providers
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The event bus
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The event store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The event pipeline
    #[must_use]
    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }

    /// The provider registry
    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// The cost tracker
    #[must_use]
    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost_tracker
    }

    /// The mode manager
    #[must_use]
    pub fn modes(&self) -> &Arc<ModeManager> {
        &self.modes
    }

    /// The agent registry
    #[must_use]
    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// The project registry
    #[must_use]
    pub fn projects(&self) -> &Arc<ProjectRegistry> {
        &self.projects
    }

    /// The orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The fan-out manager
    #[must_use]
    pub fn fanout(&self) -> &Arc<SubscriptionManager> {
        &self.fanout
    }

    /// Aggregated health over the store and every provider
    pub async fn health(&self) -> HealthReport {
        let providers = self.providers.health().await;
        let status = if providers.values().all(|h| h.healthy) {
            "ok"
        } else {
            "degraded"
        };
        HealthReport {
            status: status.to_string(),
            store: self.store.name().to_string(),
            providers,
        }
    }

    /// Graceful shutdown: stop intake, cancel and drain active tasks,
    /// close subscriptions
    pub async fn shutdown(&self) {
        self.shutdown.shutdown().await;
        self.pipeline
            .publish(
                EventKind::SystemShutdown,
                Uuid::nil(),
                AggregateType::Execution,
                serde_json::json!({}),
            )
            .await;
        self.fanout.close_all().await;
        info!("Maestro stopped");
    }
}
