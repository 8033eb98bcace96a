//! AUTONOMY mode: the full eight-phase pipeline through deployment,
//! running unattended. Simpler work drops to the fallback model when local
//! models are preferred.

use super::{AgentSelection, Mode, ModeConfig, ModelSpec, ValidationConfig};
use crate::agent::AgentKind;
use crate::modes::ModeStrategy;
use crate::task::{Complexity, Phase, Subtask};

pub(super) struct AutonomyStrategy {
    config: ModeConfig,
}

impl AutonomyStrategy {
    pub(super) fn new(config: ModeConfig) -> Self {
        Self { config }
    }
}

impl ModeStrategy for AutonomyStrategy {
    fn mode(&self) -> Mode {
        Mode::Autonomy
    }

    fn config(&self) -> &ModeConfig {
        &self.config
    }

    fn decompose(&self, description: &str) -> Vec<Phase> {
        vec![
            Phase::new(1, "Analysis", false, true).with_subtask(Subtask::new(
                format!("Analyze requirements: {description}"),
                AgentKind::Concept,
            )),
            Phase::new(2, "Architecture", false, true).with_subtask(Subtask::new(
                format!("Design the architecture: {description}"),
                AgentKind::Architect,
            )),
            Phase::new(3, "Implementation", true, true).with_subtask(Subtask::new(
                format!("Implement: {description}"),
                AgentKind::Implement,
            )),
            Phase::new(4, "Testing", false, true).with_subtask(Subtask::new(
                format!("Write and run tests for: {description}"),
                AgentKind::Test,
            )),
            Phase::new(5, "Review", true, true)
                .with_subtask(Subtask::new(
                    format!("Review the implementation of: {description}"),
                    AgentKind::Review,
                ))
                .with_subtask(Subtask::new(
                    format!("Audit security of: {description}"),
                    AgentKind::Security,
                )),
            Phase::new(6, "Optimization", false, false).with_subtask(Subtask::new(
                format!("Optimize: {description}"),
                AgentKind::Optimize,
            )),
            Phase::new(7, "Documentation", false, true).with_subtask(Subtask::new(
                format!("Document: {description}"),
                AgentKind::Docs,
            )),
            Phase::new(8, "Deployment", false, true).with_subtask(Subtask::new(
                format!("Prepare deployment for: {description}"),
                AgentKind::Deploy,
            )),
        ]
    }

    fn select_agents(&self, _description: &str) -> AgentSelection {
        AgentSelection {
            primary: AgentKind::Implement,
            secondary: vec![
                AgentKind::Concept,
                AgentKind::Architect,
                AgentKind::Test,
                AgentKind::Review,
                AgentKind::Security,
                AgentKind::Optimize,
                AgentKind::Docs,
                AgentKind::Deploy,
            ],
            skip: vec![],
        }
    }

    fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            typecheck: true,
            lint: true,
            build: true,
            tests: true,
            require_review: true,
            require_security_scan: false,
            min_coverage: None,
        }
    }

    fn select_model(&self, complexity: Complexity) -> ModelSpec {
        if complexity == Complexity::Complex || !self.config.use_local_models {
            self.config.primary_model.clone()
        } else {
            self.config.fallback_model.clone()
        }
    }
}
