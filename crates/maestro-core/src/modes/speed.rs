//! SPEED mode: one required parallel implementation phase plus an optional
//! verification pass. Build-only validation, primary model throughout.

use super::{AgentSelection, Mode, ModeConfig, ModelSpec, ValidationConfig};
use crate::agent::AgentKind;
use crate::modes::ModeStrategy;
use crate::task::{Complexity, Phase, Subtask};

pub(super) struct SpeedStrategy {
    config: ModeConfig,
}

impl SpeedStrategy {
    pub(super) fn new(config: ModeConfig) -> Self {
        Self { config }
    }
}

impl ModeStrategy for SpeedStrategy {
    fn mode(&self) -> Mode {
        Mode::Speed
    }

    fn config(&self) -> &ModeConfig {
        &self.config
    }

    fn decompose(&self, description: &str) -> Vec<Phase> {
        // The verification phase ships empty and auto-completes; patching
        // the verify agent into required_agents arms it.
        vec![
            Phase::new(1, "Implementation", true, true).with_subtask(Subtask::new(
                format!("Implement: {description}"),
                AgentKind::Implement,
            )),
            Phase::new(2, "Verification", false, false),
        ]
    }

    fn select_agents(&self, _description: &str) -> AgentSelection {
        AgentSelection {
            primary: AgentKind::Implement,
            secondary: vec![AgentKind::Verify],
            skip: vec![
                AgentKind::Concept,
                AgentKind::Architect,
                AgentKind::Test,
                AgentKind::Review,
                AgentKind::Security,
                AgentKind::Docs,
            ],
        }
    }

    fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            build: true,
            ..ValidationConfig::default()
        }
    }

    fn select_model(&self, _complexity: Complexity) -> ModelSpec {
        self.config.primary_model.clone()
    }
}
