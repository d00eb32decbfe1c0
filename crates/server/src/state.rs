use std::sync::Arc;
use streambatch_core::{BatchOrchestrator, Config, LimitGate, SanitizedConfig, Transformer};

use crate::registry::BatchRegistry;

/// Orchestrator over whichever transformer backend was configured.
pub type Orchestrator = BatchOrchestrator<Arc<dyn Transformer>>;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    batches: BatchRegistry,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        let batches = BatchRegistry::with_retention(config.server.retained_batches);
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            batches,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn batches(&self) -> &BatchRegistry {
        &self.batches
    }

    /// Size limits applied to every batch before it starts.
    pub fn limits(&self) -> LimitGate {
        LimitGate::new(self.config.batch.max_items, self.config.batch.max_total_bytes)
    }
}
