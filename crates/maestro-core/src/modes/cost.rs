//! COST mode: local implementation, optional testing, hard spend cap.
//! Complex work escalates to the cheapest cloud model.

use super::{AgentSelection, Mode, ModeConfig, ModelSpec, ValidationConfig};
use crate::agent::AgentKind;
use crate::modes::ModeStrategy;
use crate::task::{Complexity, Phase, Subtask};
use maestro_llm::CostMicros;

pub(super) struct CostStrategy {
    config: ModeConfig,
}

impl CostStrategy {
    pub(super) fn new(config: ModeConfig) -> Self {
        Self { config }
    }
}

impl ModeStrategy for CostStrategy {
    fn mode(&self) -> Mode {
        Mode::Cost
    }

    fn config(&self) -> &ModeConfig {
        &self.config
    }

    fn decompose(&self, description: &str) -> Vec<Phase> {
        vec![
            Phase::new(1, "Implementation", false, true).with_subtask(Subtask::new(
                format!("Implement: {description}"),
                AgentKind::Implement,
            )),
            Phase::new(2, "Testing", false, false).with_subtask(Subtask::new(
                format!("Write tests for: {description}"),
                AgentKind::Test,
            )),
        ]
    }

    fn select_agents(&self, _description: &str) -> AgentSelection {
        AgentSelection {
            primary: AgentKind::Implement,
            secondary: vec![AgentKind::Test],
            skip: vec![
                AgentKind::Concept,
                AgentKind::Architect,
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

    fn select_model(&self, complexity: Complexity) -> ModelSpec {
        // Local for simple and medium work, cheapest cloud model otherwise
        if complexity == Complexity::Complex {
            self.config.fallback_model.clone()
        } else {
            self.config.primary_model.clone()
        }
    }

    fn should_continue(&self, current_cost: CostMicros) -> bool {
        match self.config.cost_limit {
            Some(limit) => current_cost < limit,
            None => true,
        }
    }
}
