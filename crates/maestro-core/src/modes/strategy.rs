//! Strategy trait and the static strategy registry
//!
//! Strategies are constructed from a mode's configuration through a fixed
//! match, never by dynamic lookup. Switching modes or patching a config
//! rebuilds the strategy object.

use super::autonomy::AutonomyStrategy;
use super::cost::CostStrategy;
use super::quality::QualityStrategy;
use super::speed::SpeedStrategy;
use super::{AgentSelection, Mode, ModeConfig, ModelSpec, ValidationConfig};
use crate::task::{Complexity, Phase};
use maestro_llm::CostMicros;
use std::sync::Arc;

/// Execution policy behind a mode
pub trait ModeStrategy: Send + Sync {
    /// The mode this strategy implements
    fn mode(&self) -> Mode;

    /// The configuration the strategy was built from
    fn config(&self) -> &ModeConfig;

    /// Produce a phase plan for a task description
    fn decompose(&self, description: &str) -> Vec<Phase>;

    /// Choose agents for a description
    fn select_agents(&self, description: &str) -> AgentSelection;

    /// The validation gates this mode requires
    fn validation_config(&self) -> ValidationConfig;

    /// Pick a model for a complexity class
    fn select_model(&self, complexity: Complexity) -> ModelSpec;

    /// Whether execution may continue at the given cumulative cost
    fn should_continue(&self, _current_cost: CostMicros) -> bool {
        true
    }
}

/// Build the strategy for a mode from its configuration.
///
/// This is the complete mapping; adding a mode means adding an arm here.
#[must_use]
pub fn strategy_for(mode: Mode, config: ModeConfig) -> Arc<dyn ModeStrategy> {
    match mode {
        Mode::Speed => Arc::new(SpeedStrategy::new(config)),
        Mode::Quality => Arc::new(QualityStrategy::new(config)),
        Mode::Autonomy => Arc::new(AutonomyStrategy::new(config)),
        Mode::Cost => Arc::new(CostStrategy::new(config)),
    }
}
