//! QUALITY mode: design, implementation, full validation, and docs.
//! Implementation picks up a parallel translation subtask when the
//! description touches UI or localization work.

use super::{AgentSelection, Mode, ModeConfig, ModelSpec, ValidationConfig};
use crate::agent::AgentKind;
use crate::modes::ModeStrategy;
use crate::task::{Complexity, Phase, Subtask};

/// Description markers that pull in the translation agent
const TRANSLATION_MARKERS: &[&str] = &["ui", "translation", "multilingual"];

pub(super) struct QualityStrategy {
    config: ModeConfig,
}

impl QualityStrategy {
    pub(super) fn new(config: ModeConfig) -> Self {
        Self { config }
    }

    fn wants_translations(description: &str) -> bool {
        let lower = description.to_lowercase();
        TRANSLATION_MARKERS
            .iter()
            .any(|marker| lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == *marker))
    }
}

impl ModeStrategy for QualityStrategy {
    fn mode(&self) -> Mode {
        Mode::Quality
    }

    fn config(&self) -> &ModeConfig {
        &self.config
    }

    fn decompose(&self, description: &str) -> Vec<Phase> {
        let mut implementation = Phase::new(2, "Implementation", true, true).with_subtask(
            Subtask::new(format!("Implement: {description}"), AgentKind::Implement),
        );
        if Self::wants_translations(description) {
            implementation = implementation.with_subtask(Subtask::new(
                format!("Provide translations for: {description}"),
                AgentKind::Translate,
            ));
        }

        vec![
            Phase::new(1, "Design", false, true)
                .with_subtask(Subtask::new(
                    format!("Analyze requirements: {description}"),
                    AgentKind::Concept,
                ))
                .with_subtask(Subtask::new(
                    format!("Design the architecture: {description}"),
                    AgentKind::Architect,
                )),
            implementation,
            Phase::new(3, "Validation", true, true)
                .with_subtask(Subtask::new(
                    format!("Write tests for: {description}"),
                    AgentKind::Test,
                ))
                .with_subtask(Subtask::new(
                    format!("Review the implementation of: {description}"),
                    AgentKind::Review,
                ))
                .with_subtask(Subtask::new(
                    format!("Audit security of: {description}"),
                    AgentKind::Security,
                )),
            Phase::new(4, "Documentation", false, true).with_subtask(Subtask::new(
                format!("Document: {description}"),
                AgentKind::Docs,
            )),
        ]
    }

    fn select_agents(&self, description: &str) -> AgentSelection {
        let mut secondary = vec![
            AgentKind::Concept,
            AgentKind::Architect,
            AgentKind::Test,
            AgentKind::Review,
            AgentKind::Security,
            AgentKind::Docs,
        ];
        if Self::wants_translations(description) {
            secondary.push(AgentKind::Translate);
        }
        AgentSelection {
            primary: AgentKind::Implement,
            secondary,
            skip: vec![AgentKind::Deploy],
        }
    }

    fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            typecheck: true,
            lint: true,
            build: true,
            tests: true,
            require_review: true,
            require_security_scan: true,
            min_coverage: Some(0.80),
        }
    }

    fn select_model(&self, _complexity: Complexity) -> ModelSpec {
        self.config.primary_model.clone()
    }
}
