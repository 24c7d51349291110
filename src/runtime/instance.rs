//! Live message instances
//!
//! An `Instance` owns one external message and its handler table, and runs
//! its commits through a `CommitScheduler`. Commits execute on a spawned
//! driver task that lives only while the instance has work in flight.
//!
//! While active, an instance is owned by the runtime's registry; it refers
//! back to the registry weakly.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use uuid::Uuid;

use super::error::{HostResult, RenderError, RenderResult, RouteError};
use super::host::{self, ExternalMessage, MessageId};
use super::message::{MessageLimits, MessageRepresentation};
use super::node::{Handler, Snapshot};
use super::registry::Registry;
use super::scheduler::{Commit, CommitKind, CommitScheduler, Install, PendingRender, Submission};
use super::translate::{self, HandlerTable, Rendered};

/// Instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Create a new random InstanceId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Accepting renders and interactions
    Active,
    /// Controls disabled, no longer listening; message kept
    Deactivated,
    /// Message deleted; terminal
    Destroyed,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Active => "active",
            InstanceState::Deactivated => "deactivated",
            InstanceState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Serializable summary of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance id
    pub id: InstanceId,
    /// External message id
    pub message_id: MessageId,
    /// Lifecycle state
    pub state: InstanceState,
    /// Position in creation order
    pub sequence: u64,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
}

struct InstanceCore {
    state: InstanceState,
    scheduler: CommitScheduler,
    current_snapshot: Snapshot,
    handlers: HandlerTable,
}

pub(crate) struct InstanceShared {
    pub(crate) id: InstanceId,
    pub(crate) sequence: u64,
    pub(crate) message_id: MessageId,
    created_at: DateTime<Utc>,
    message: Arc<dyn ExternalMessage>,
    limits: MessageLimits,
    host_timeout: Option<Duration>,
    registry: Weak<Registry>,
    spawner: RuntimeHandle,
    core: Mutex<InstanceCore>,
    settled: watch::Sender<bool>,
}

/// Parts needed to assemble an instance after its message was sent
pub(crate) struct InstanceParts {
    pub sequence: u64,
    pub message: Arc<dyn ExternalMessage>,
    pub initial: Rendered,
    pub snapshot: Snapshot,
    pub limits: MessageLimits,
    pub host_timeout: Option<Duration>,
    pub registry: Weak<Registry>,
    pub spawner: RuntimeHandle,
}

/// Handle to a live message instance
///
/// Cloning the handle shares the instance. Dropping every handle does not
/// end it: the registry keeps an active instance routed until it is
/// deactivated, destroyed or evicted.
#[derive(Clone)]
pub struct Instance {
    pub(crate) shared: Arc<InstanceShared>,
}

/// Non-owning instance handle, for handlers that re-render their own instance
#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceShared>);

impl WeakInstance {
    /// Upgrade to a full handle if the instance is still alive
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|shared| Instance { shared })
    }
}

impl Instance {
    pub(crate) fn create(parts: InstanceParts) -> Self {
        let InstanceParts {
            sequence,
            message,
            initial,
            snapshot,
            limits,
            host_timeout,
            registry,
            spawner,
        } = parts;
        let (settled, _) = watch::channel(true);

        let shared = InstanceShared {
            id: InstanceId::new(),
            sequence,
            message_id: message.id(),
            created_at: Utc::now(),
            message,
            limits,
            host_timeout,
            registry,
            spawner,
            core: Mutex::new(InstanceCore {
                state: InstanceState::Active,
                scheduler: CommitScheduler::new(initial.message),
                current_snapshot: snapshot,
                handlers: initial.handlers,
            }),
            settled,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub(crate) fn from_shared(shared: Arc<InstanceShared>) -> Self {
        Self { shared }
    }

    /// Instance id
    pub fn id(&self) -> InstanceId {
        self.shared.id
    }

    /// Id of the external message this instance owns
    pub fn message_id(&self) -> &MessageId {
        &self.shared.message_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> InstanceState {
        self.shared.core.lock().state
    }

    /// Position in creation order
    pub fn sequence(&self) -> u64 {
        self.shared.sequence
    }

    /// Serializable summary
    pub fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.shared.id,
            message_id: self.shared.message_id.clone(),
            state: self.state(),
            sequence: self.shared.sequence,
            created_at: self.shared.created_at,
        }
    }

    /// Representation the external message reflects, per the last successful commit
    pub fn committed_message(&self) -> Option<MessageRepresentation> {
        self.shared.core.lock().scheduler.committed().cloned()
    }

    /// Most recently committed snapshot
    pub fn current_snapshot(&self) -> Snapshot {
        self.shared.core.lock().current_snapshot.clone()
    }

    /// Snapshot waiting behind an in-flight commit
    pub fn pending_snapshot(&self) -> Option<Snapshot> {
        self.shared.core.lock().scheduler.pending_snapshot().cloned()
    }

    /// True when nothing is pending or in flight
    pub fn is_settled(&self) -> bool {
        self.shared.core.lock().scheduler.is_idle()
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Arc::downgrade(&self.shared))
    }

    /// Request that the message reflect `snapshot`
    ///
    /// Translation errors and `InstanceDestroyed` are returned immediately.
    /// The returned future resolves when this snapshot, or a later one that
    /// replaced it, has been committed; host failures arrive through it.
    /// Renders on a deactivated instance are ignored.
    pub fn request_render(&self, snapshot: Snapshot) -> RenderResult<PendingRender> {
        let pending = {
            let mut core = self.shared.core.lock();
            match core.state {
                InstanceState::Destroyed => {
                    return Err(RenderError::InstanceDestroyed(self.shared.id.to_string()));
                }
                InstanceState::Deactivated => {
                    tracing::debug!(instance = %self.shared.id, "render ignored on deactivated instance");
                    return Ok(PendingRender::ready(Ok(())));
                }
                InstanceState::Active => {}
            }

            let Rendered { message, handlers } = translate::render(&snapshot, &self.shared.limits)?;
            let install = Install { snapshot, handlers };
            let (commit, pending) = Commit::new(CommitKind::Edit(message), Some(install));
            self.submit(&mut core, commit);
            pending
        };

        if let Some(registry) = self.shared.registry.upgrade() {
            registry.touch(&self.shared.id);
        }
        Ok(pending)
    }

    /// Render and wait for the commit
    pub async fn render(&self, snapshot: Snapshot) -> RenderResult<()> {
        self.request_render(snapshot)?.await
    }

    /// Wait until nothing is pending or in flight
    pub async fn await_settled(&self) {
        let mut settled = self.shared.settled.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = settled.wait_for(|done| *done).await;
    }

    /// Disable every control, stop listening, keep the message
    ///
    /// Idempotent: a no-op unless the instance is active. An edit already in
    /// flight completes first; a render still pending behind it is dropped
    /// and fails with `InstanceDeactivated`.
    pub fn deactivate(&self) -> PendingRender {
        let mut core = self.shared.core.lock();
        if core.state != InstanceState::Active {
            return PendingRender::ready(Ok(()));
        }

        core.state = InstanceState::Deactivated;
        core.handlers.clear();
        self.release();
        if let Some(superseded) = core.scheduler.discard_pending() {
            superseded.resolve(Err(RenderError::InstanceDeactivated(self.shared.id.to_string())));
        }
        tracing::info!(instance = %self.shared.id, message = %self.shared.message_id, "instance deactivated");

        let (commit, pending) = Commit::new(CommitKind::DisableAll, None);
        self.submit(&mut core, commit);
        pending
    }

    /// Delete the message and tear the instance down
    ///
    /// Idempotent: the message is deleted at most once. Renders still
    /// pending fail with `InstanceDestroyed`. Calling it again after a failed
    /// delete retries the delete; while one is in flight the call waits on it.
    pub fn destroy(&self) -> PendingRender {
        let mut core = self.shared.core.lock();
        match core.state {
            InstanceState::Destroyed => {
                // Elided by the scheduler once the message is gone.
                let (commit, pending) = Commit::new(CommitKind::Delete, None);
                self.submit(&mut core, commit);
                return pending;
            }
            InstanceState::Active => self.release(),
            InstanceState::Deactivated => {}
        }
        core.state = InstanceState::Destroyed;
        core.handlers.clear();
        core.current_snapshot.clear();
        if let Some(superseded) = core.scheduler.discard_pending() {
            superseded.resolve(Err(RenderError::InstanceDestroyed(self.shared.id.to_string())));
        }
        tracing::info!(instance = %self.shared.id, message = %self.shared.message_id, "instance destroyed");

        let (commit, pending) = Commit::new(CommitKind::Delete, None);
        self.submit(&mut core, commit);
        pending
    }

    /// Handler registered for `custom_id` by the last committed snapshot
    pub(crate) fn handler(&self, custom_id: &str) -> Result<Handler, RouteError> {
        let core = self.shared.core.lock();
        if core.state != InstanceState::Active {
            return Err(RouteError::StaleInteraction(custom_id.to_string()));
        }
        core.handlers
            .get(custom_id)
            .cloned()
            .ok_or_else(|| RouteError::StaleInteraction(custom_id.to_string()))
    }

    /// Drop the registry's ownership and routing entry
    fn release(&self) {
        if let Some(registry) = self.shared.registry.upgrade() {
            registry.remove(&self.shared.id);
        }
    }

    fn submit(&self, core: &mut InstanceCore, commit: Commit) {
        match core.scheduler.submit(commit) {
            Submission::Elided(mut commit) => {
                tracing::debug!(instance = %self.shared.id, "commit elided, message unchanged");
                if let Some(install) = commit.take_install() {
                    core.current_snapshot = install.snapshot;
                    core.handlers = install.handlers;
                }
                commit.resolve(Ok(()));
            }
            Submission::Started => {
                self.shared.settled.send_replace(false);
                self.shared.spawner.spawn(drive(self.shared.clone()));
            }
            Submission::Joined | Submission::Queued => {}
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.shared.id)
            .field("message_id", &self.shared.message_id)
            .field("sequence", &self.shared.sequence)
            .finish()
    }
}

impl InstanceShared {
    async fn execute(&self, kind: CommitKind) -> HostResult<()> {
        let operation = kind.name();
        let timeout = self.host_timeout;
        match kind {
            CommitKind::Edit(message) => {
                tracing::debug!(
                    instance = %self.id,
                    fingerprint = %message.fingerprint(),
                    "editing message"
                );
                host::with_timeout(operation, timeout, self.message.edit(message)).await
            }
            CommitKind::DisableAll => {
                host::with_timeout(operation, timeout, self.message.disable_components()).await
            }
            CommitKind::Delete => host::with_timeout(operation, timeout, self.message.delete()).await,
        }
    }
}

/// Execute in-flight commits one at a time until none remain
async fn drive(shared: Arc<InstanceShared>) {
    loop {
        let next = {
            let core = shared.core.lock();
            core.scheduler.in_flight_kind()
        };
        let Some(kind) = next else {
            break;
        };

        let operation = kind.name();
        let result = shared.execute(kind).await;
        if let Err(err) = &result {
            tracing::warn!("{} failed for instance {}: {}", operation, shared.id, err);
        }

        let more = {
            let mut core = shared.core.lock();
            let completion = core.scheduler.complete(result);
            if let Some(install) = completion.install {
                if core.state == InstanceState::Active {
                    core.current_snapshot = install.snapshot;
                    core.handlers = install.handlers;
                }
            }
            if !completion.more {
                shared.settled.send_replace(true);
            }
            completion.more
        };
        if !more {
            break;
        }
    }
}
