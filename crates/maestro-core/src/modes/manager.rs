//! Mode manager
//!
//! Holds the active mode and the four strategy objects. Switching and
//! config updates publish mode events; only one switch may be in flight at
//! a time. In-progress tasks keep the strategy snapshot they started with;
//! a switch only affects later submissions.

use super::{strategy_for, Mode, ModeConfig, ModeConfigPatch, ModeStrategy};
use crate::error::{Error, Result};
use crate::pipeline::EventPipeline;
use maestro_events::EventKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

struct ManagerState {
    current: Mode,
    configs: HashMap<Mode, ModeConfig>,
    strategies: HashMap<Mode, Arc<dyn ModeStrategy>>,
}

/// Owns mode configurations and strategies
pub struct ModeManager {
    events: Arc<EventPipeline>,
    state: RwLock<ManagerState>,
    switching: AtomicBool,
}

impl ModeManager {
    /// Create a manager with baseline configs for every mode
    #[must_use]
    pub fn new(events: Arc<EventPipeline>, default_mode: Mode) -> Self {
        let mut configs = HashMap::new();
        let mut strategies = HashMap::new();
        for &mode in Mode::ALL {
            let config = ModeConfig::defaults(mode);
            strategies.insert(mode, strategy_for(mode, config.clone()));
            configs.insert(mode, config);
        }
        Self {
            events,
            state: RwLock::new(ManagerState {
                current: default_mode,
                configs,
                strategies,
            }),
            switching: AtomicBool::new(false),
        }
    }

    /// The active mode
    pub async fn current(&self) -> Mode {
        self.state.read().await.current
    }

    /// Configuration of a mode
    pub async fn config_for(&self, mode: Mode) -> ModeConfig {
        self.state.read().await.configs[&mode].clone()
    }

    /// Strategy object of a mode
    pub async fn strategy(&self, mode: Mode) -> Arc<dyn ModeStrategy> {
        Arc::clone(&self.state.read().await.strategies[&mode])
    }

    /// Strategy object of the active mode
    pub async fn current_strategy(&self) -> Arc<dyn ModeStrategy> {
        let state = self.state.read().await;
        Arc::clone(&state.strategies[&state.current])
    }

    /// Switch the active mode.
    ///
    /// Rejects with `conflict` while another switch is in progress. A
    /// switch to the current mode is a no-op.
    pub async fn switch_mode(&self, target: Mode) -> Result<()> {
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Conflict("mode switch in progress".into()));
        }

        let result = self.do_switch(target).await;
        self.switching.store(false, Ordering::SeqCst);
        result
    }

    async fn do_switch(&self, target: Mode) -> Result<()> {
        let from = self.current().await;
        if from == target {
            return Ok(());
        }

        self.events
            .publish_mode(
                EventKind::ModeSwitching,
                serde_json::json!({"from": from, "to": target}),
            )
            .await;

        self.state.write().await.current = target;

        self.events
            .publish_mode(
                EventKind::ModeSwitched,
                serde_json::json!({"from": from, "to": target}),
            )
            .await;

        info!(from = %from, to = %target, "Mode switched");
        Ok(())
    }

    /// Merge a partial config into a mode's baseline and rebuild its
    /// strategy
    pub async fn update_config(&self, mode: Mode, patch: &ModeConfigPatch) -> Result<ModeConfig> {
        let updated = {
            let mut state = self.state.write().await;
            let config = state
                .configs
                .get_mut(&mode)
                .ok_or_else(|| Error::NotFound(format!("mode {mode}")))?;
            patch.apply(config);
            let updated = config.clone();
            state.strategies.insert(mode, strategy_for(mode, updated.clone()));
            updated
        };

        self.events
            .publish_mode(
                EventKind::ModeConfigUpdated,
                serde_json::json!({"mode": mode, "config": updated}),
            )
            .await;

        Ok(updated)
    }
}
