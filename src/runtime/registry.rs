//! Process-wide registry of active instances
//!
//! The registry owns every active instance until it is deactivated, destroyed
//! or evicted, so an instance keeps routing after the caller drops its handle.
//! An id-keyed index carries the creation and render order used for eviction;
//! the caller performs the deactivation after the registry lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::host::MessageId;
use super::instance::{Instance, InstanceId, InstanceShared};

/// Which active instance is deactivated when capacity is exceeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest by creation (FIFO)
    #[default]
    CreationOrder,
    /// Least recently rendered
    RenderOrder,
}

struct RegistryEntry {
    id: InstanceId,
    message_id: MessageId,
    sequence: u64,
    last_render: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<RegistryEntry>,
    instances: HashMap<InstanceId, Arc<InstanceShared>>,
    clock: u64,
}

impl RegistryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn take(&mut self, id: &InstanceId) -> Option<Arc<InstanceShared>> {
        self.entries.retain(|entry| &entry.id != id);
        self.instances.remove(id)
    }
}

/// Registry of active instances with a capacity bound
pub struct Registry {
    capacity: Option<usize>,
    policy: EvictionPolicy,
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Create a registry; `None` capacity means unbounded
    pub fn new(capacity: Option<usize>, policy: EvictionPolicy) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Configured eviction policy
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Number of active instances
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when no instance is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next creation sequence number
    pub(crate) fn next_sequence(&self) -> u64 {
        self.state.lock().tick()
    }

    /// Take ownership of a new instance and return the instances it evicts
    pub(crate) fn insert(&self, instance: Arc<InstanceShared>) -> Vec<Instance> {
        let mut state = self.state.lock();
        let last_render = state.tick();
        let newest = instance.id;
        state.entries.push(RegistryEntry {
            id: newest,
            message_id: instance.message_id.clone(),
            sequence: instance.sequence,
            last_render,
        });
        state.instances.insert(newest, instance);

        let mut evicted = Vec::new();
        let Some(capacity) = self.capacity else {
            return evicted;
        };
        while state.entries.len() > capacity {
            let Some(index) = pick_victim(&state.entries, &newest, self.policy) else {
                break;
            };
            let victim = state.entries.remove(index);
            tracing::debug!(
                "Evicting instance {} (sequence {}) over capacity {}",
                victim.id,
                victim.sequence,
                capacity
            );
            if let Some(shared) = state.instances.remove(&victim.id) {
                evicted.push(Instance::from_shared(shared));
            }
        }
        evicted
    }

    /// Release an instance; returns whether it was registered
    pub(crate) fn remove(&self, id: &InstanceId) -> bool {
        let removed = self.state.lock().take(id);
        removed.is_some()
    }

    /// Record a render for render-order eviction
    pub(crate) fn touch(&self, id: &InstanceId) {
        let mut state = self.state.lock();
        let now = state.tick();
        if let Some(entry) = state.entries.iter_mut().find(|entry| &entry.id == id) {
            entry.last_render = now;
        }
    }

    /// Active instance owning a message
    pub(crate) fn lookup(&self, message_id: &MessageId) -> Option<Instance> {
        let state = self.state.lock();
        let entry = state
            .entries
            .iter()
            .find(|entry| &entry.message_id == message_id)?;
        state.instances.get(&entry.id).cloned().map(Instance::from_shared)
    }

    /// Active instance by id
    pub(crate) fn get(&self, id: &InstanceId) -> Option<Instance> {
        self.state
            .lock()
            .instances
            .get(id)
            .cloned()
            .map(Instance::from_shared)
    }

    /// Active instances in creation order
    pub(crate) fn active(&self) -> Vec<Instance> {
        let state = self.state.lock();
        let mut instances: Vec<Instance> = state
            .instances
            .values()
            .cloned()
            .map(Instance::from_shared)
            .collect();
        instances.sort_by_key(Instance::sequence);
        instances
    }
}

/// Index of the entry to evict, never the newly inserted one
fn pick_victim(entries: &[RegistryEntry], newest: &InstanceId, policy: EvictionPolicy) -> Option<usize> {
    let candidates = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| &entry.id != newest);
    let victim = match policy {
        EvictionPolicy::CreationOrder => candidates.min_by_key(|(_, entry)| entry.sequence),
        EvictionPolicy::RenderOrder => candidates.min_by_key(|(_, entry)| entry.last_render),
    };
    victim.map(|(index, _)| index)
}
