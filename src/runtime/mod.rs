//! Runtime orchestrator and public API
//!
//! This module provides the `Runtime` struct that owns the instance registry
//! and the message host, and exposes creation and interaction routing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Submodules
pub mod error;
pub mod host;
pub mod instance;
pub mod message;
pub mod node;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod translate;

use error::{ConfigError, ConfigResult, Result, RuntimeError};
use host::{MessageHost, SendOptions};
use instance::{Instance, InstanceId, InstanceInfo, InstanceParts};
use message::MessageLimits;
use node::Snapshot;
use registry::{EvictionPolicy, Registry};
use router::{Dispatch, InteractionEvent};

/// Intended bound on concurrently active instances
pub const DEFAULT_MAX_INSTANCES: usize = 50;

/// Configuration for the livemsg runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum concurrently active instances (unset: unbounded)
    #[serde(default)]
    pub max_instances: Option<usize>,

    /// Which instance is deactivated when the bound is exceeded
    #[serde(default)]
    pub eviction: EvictionPolicy,

    /// Structural limits of the host platform
    #[serde(default)]
    pub limits: MessageLimits,

    /// Timeout applied to every host operation, in milliseconds
    #[serde(default)]
    pub host_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_instances: None,
            eviction: EvictionPolicy::CreationOrder,
            limits: MessageLimits::default(),
            host_timeout_ms: None,
        }
    }
}

impl RuntimeConfig {
    /// Config with a capacity bound
    pub fn bounded(max_instances: usize) -> Self {
        Self {
            max_instances: Some(max_instances),
            ..Self::default()
        }
    }

    /// Check for values the runtime cannot operate with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_instances == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        let limits = [
            ("max_embeds", self.limits.max_embeds),
            ("max_rows", self.limits.max_rows),
            ("max_components_per_row", self.limits.max_components_per_row),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        Ok(())
    }

    /// Host operation timeout
    pub fn host_timeout(&self) -> Option<Duration> {
        self.host_timeout_ms.map(Duration::from_millis)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let data = std::fs::read(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The main runtime orchestrator
///
/// Creates instances through the message host, keeps the registry of active
/// instances within capacity, and routes interactions back to them.
pub struct Runtime {
    config: RuntimeConfig,
    host: Arc<dyn MessageHost>,
    registry: Arc<Registry>,
    spawner: tokio::runtime::Handle,
}

impl Runtime {
    /// Create a runtime with the given configuration and host
    ///
    /// Must be called from within a Tokio runtime; commits run on it.
    pub fn new(config: RuntimeConfig, host: impl MessageHost + 'static) -> Result<Self> {
        config.validate()?;
        let spawner = tokio::runtime::Handle::try_current()
            .map_err(|err| RuntimeError::Init(format!("no Tokio runtime: {}", err)))?;
        let registry = Arc::new(Registry::new(config.max_instances, config.eviction));

        Ok(Self {
            config,
            host: Arc::new(host),
            registry,
            spawner,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the registry of active instances
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Send a new message rendering `snapshot` and register it as an instance
    ///
    /// If the registry is over capacity afterwards, one other active
    /// instance is deactivated according to the eviction policy.
    pub async fn send(&self, snapshot: Snapshot, options: SendOptions) -> Result<Instance> {
        options.validate()?;
        let initial = translate::render(&snapshot, &self.config.limits)?;
        let timeout = self.config.host_timeout();
        let message = host::with_timeout(
            "send",
            timeout,
            self.host.send(initial.message.clone(), options),
        )
        .await?;

        let instance = Instance::create(InstanceParts {
            sequence: self.registry.next_sequence(),
            message,
            initial,
            snapshot,
            limits: self.config.limits,
            host_timeout: timeout,
            registry: Arc::downgrade(&self.registry),
            spawner: self.spawner.clone(),
        });
        tracing::info!(
            "Created instance {} for message {}",
            instance.id(),
            instance.message_id()
        );

        for victim in self.registry.insert(instance.shared.clone()) {
            tracing::info!("Capacity exceeded, deactivating instance {}", victim.id());
            // Host failures of the disable commit are logged by its driver.
            drop(victim.deactivate());
        }
        Ok(instance)
    }

    /// Route an interaction event to its handler
    ///
    /// Never fails: unknown messages and stale controls come back as
    /// `Dispatch::Ignored`.
    pub fn dispatch(&self, event: &InteractionEvent) -> Dispatch {
        router::dispatch(&self.registry, event)
    }

    /// Active instance by id
    pub fn instance(&self, id: &InstanceId) -> Option<Instance> {
        self.registry.get(id)
    }

    /// Summaries of active instances in creation order
    pub fn active_instances(&self) -> Vec<InstanceInfo> {
        self.registry.active().iter().map(Instance::info).collect()
    }
}

// Re-export commonly used types
pub use error::{RenderError, TranslateError};
pub use host::{MemoryHost, MessageId};
pub use instance::InstanceState;
pub use message::MessageRepresentation;
pub use node::{Handler, HostNode};
pub use scheduler::PendingRender;
