//! The orchestrator: public contract for the control plane and request path.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::schema::LocalConfigJson;
use crate::ingress::{Ingress, OriginRequestConfig, Rule, WarpRoutingConfig};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics::{self, outcome};
use crate::orchestration::generation::{
    CommitOutcome, Generation, GenerationError, GenerationManager, INITIAL_VERSION,
};
use crate::orchestration::merger::{ConfigMerger, RuntimeConfig};
use crate::orchestration::overrides::LocalOverrides;
use crate::proxy::{BuildError, Proxy, ProxyBuilder, Tag};

/// Error type returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build routing engine: {0}")]
    Build(#[from] BuildError),

    #[error("orchestrator is closed")]
    Closed,

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl From<GenerationError> for OrchestratorError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Closed => OrchestratorError::Closed,
        }
    }
}

/// Result of one `update_config` call.
#[derive(Debug)]
pub struct UpdateOutcome {
    /// Version current once the call returned, whether or not this update
    /// was the one applied.
    pub last_applied_version: i32,
    pub result: Result<(), OrchestratorError>,
}

impl UpdateOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Configuration the first generation is built from.
#[derive(Debug, Clone, Default)]
pub struct InitialConfig {
    pub ingress: Ingress,
    pub warp_routing: WarpRoutingConfig,
    /// Raw local override map; see `orchestration::overrides` for the keys.
    pub local_overrides: HashMap<String, String>,
}

impl InitialConfig {
    /// Validate a local configuration file's content.
    pub fn from_local(local: &LocalConfigJson) -> Result<Self, ConfigError> {
        let defaults = OriginRequestConfig::default().with_overrides(&local.remote.origin_request);
        Ok(Self {
            ingress: Ingress::parse(&local.remote.ingress, defaults)?,
            warp_routing: WarpRoutingConfig::from_json(&local.remote.warp_routing),
            local_overrides: local
                .configuration_flags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }
}

/// Accepts versioned configuration updates and publishes routing engines.
///
/// Every operation is safe to call concurrently. `update_config` and
/// `force_update_ingress` must be called from within a Tokio runtime.
#[derive(Debug)]
pub struct Orchestrator {
    generations: Arc<GenerationManager>,
    merger: ConfigMerger,
    builder: ProxyBuilder,
    tags: Vec<Tag>,
    span: tracing::Span,
}

impl Orchestrator {
    /// Build and install the first generation.
    ///
    /// When `cancel` fires, the current generation is released and further
    /// updates fail with [`OrchestratorError::Closed`].
    pub fn new(
        initial: InitialConfig,
        tags: Vec<Tag>,
        internal_rules: Vec<Rule>,
        mut cancel: ShutdownSignal,
    ) -> Result<Self, OrchestratorError> {
        let span = tracing::info_span!("orchestrator", tags = %format_tags(&tags));
        let _enter = span.enter();

        let builder = ProxyBuilder::new(&tags)?;
        let merger = ConfigMerger::new(internal_rules, LocalOverrides::from(initial.local_overrides));
        let config = Arc::new(merger.merge_typed(initial.ingress, initial.warp_routing)?);
        let (proxy, release) = builder.build(Arc::clone(&config))?;

        let generations = Arc::new(GenerationManager::new(Generation::new(
            INITIAL_VERSION,
            config,
            Arc::new(proxy),
            release,
        )));

        let weak = Arc::downgrade(&generations);
        tokio::spawn(async move {
            cancel.recv().await;
            // Every sender dropped without a trigger is not a cancellation.
            if !cancel.is_triggered() {
                return;
            }
            if let Some(generations) = weak.upgrade() {
                generations.shutdown();
            }
        });

        tracing::info!(
            rules = generations.current().config.ingress.rules().len(),
            "Orchestrator started"
        );
        drop(_enter);

        Ok(Self {
            generations,
            merger,
            builder,
            tags,
            span,
        })
    }

    /// Apply a versioned update.
    ///
    /// A version not newer than the current one is a successful no-op and
    /// the payload is not even parsed. Malformed payloads, invalid rules and
    /// build failures leave the current generation untouched.
    pub fn update_config(&self, version: i32, payload: &[u8]) -> UpdateOutcome {
        let _enter = self.span.enter();

        if self.generations.is_closed() {
            return self.reject(version, OrchestratorError::Closed);
        }

        let current_version = self.generations.current_version();
        if version <= current_version {
            return self.stale(version, current_version);
        }

        let config = match self.merger.merge_payload(payload) {
            Ok(config) => Arc::new(config),
            Err(e) => return self.reject(version, e.into()),
        };

        let (proxy, release) = match self.builder.build(Arc::clone(&config)) {
            Ok(built) => built,
            Err(e) => return self.reject(version, e.into()),
        };

        match self.generations.commit(version, config, Arc::new(proxy), release) {
            Ok(CommitOutcome::Applied { version }) => {
                metrics::record_update(outcome::APPLIED);
                tracing::info!(version, "Updated to new configuration");
                UpdateOutcome {
                    last_applied_version: version,
                    result: Ok(()),
                }
            }
            Ok(CommitOutcome::Stale { current_version }) => self.stale(version, current_version),
            Err(e) => self.reject(version, e.into()),
        }
    }

    /// Replace the ingress and warp routing without a version check.
    ///
    /// The rules are validated like an update's; local overrides and
    /// internal rules still apply. On error nothing changes.
    pub fn force_update_ingress(&self, ingress: Ingress, warp_routing: WarpRoutingConfig) -> Result<(), OrchestratorError> {
        let _enter = self.span.enter();

        if self.generations.is_closed() {
            return Err(OrchestratorError::Closed);
        }

        let config = Arc::new(self.merger.merge_typed(ingress, warp_routing)?);
        let (proxy, release) = self.builder.build(Arc::clone(&config))?;
        let version = self.generations.force_commit(config, Arc::new(proxy), release)?;

        tracing::info!(version, "Forced ingress update");
        Ok(())
    }

    /// Routing engine of the current generation.
    pub fn current_routing_engine(&self) -> Arc<Proxy> {
        Arc::clone(&self.generations.current().proxy)
    }

    /// Merged configuration of the current generation.
    pub fn current_config(&self) -> Arc<RuntimeConfig> {
        Arc::clone(&self.generations.current().config)
    }

    pub fn current_version(&self) -> i32 {
        self.generations.current_version()
    }

    /// Current configuration in wire form, local overrides already applied.
    pub fn current_configuration_json(&self) -> Result<Vec<u8>, OrchestratorError> {
        serde_json::to_vec(&self.current_config().to_json()).map_err(OrchestratorError::Serialize)
    }

    /// Current configuration in the local-only form, carrying the raw
    /// override map under `__configuration_flags`.
    pub fn local_config_json(&self) -> Result<Vec<u8>, OrchestratorError> {
        serde_json::to_vec(&self.merger.local_json(&self.current_config())).map_err(OrchestratorError::Serialize)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn is_closed(&self) -> bool {
        self.generations.is_closed()
    }

    /// Release the current generation and refuse further updates.
    pub fn shutdown(&self) {
        let _enter = self.span.enter();
        self.generations.shutdown();
    }

    fn stale(&self, version: i32, current_version: i32) -> UpdateOutcome {
        metrics::record_update(outcome::STALE);
        tracing::debug!(version, current_version, "Ignoring update that is not newer than current");
        UpdateOutcome {
            last_applied_version: current_version,
            result: Ok(()),
        }
    }

    fn reject(&self, version: i32, error: OrchestratorError) -> UpdateOutcome {
        metrics::record_update(outcome::REJECTED);
        let current_version = self.generations.current_version();
        tracing::warn!(version, current_version, error = %error, "Rejected configuration update");
        UpdateOutcome {
            last_applied_version: current_version,
            result: Err(error),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.generations.shutdown();
    }
}

fn format_tags(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| format!("{}={}", t.name, t.value))
        .collect::<Vec<_>>()
        .join(",")
}
