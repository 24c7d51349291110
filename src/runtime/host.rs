//! External message host boundary
//!
//! The core never speaks the chat service's protocol. It sends, edits,
//! disables and deletes messages through these traits. `MemoryHost` is an
//! in-process implementation that records every operation; it backs the
//! test suite and the demo CLI.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult, HostError, HostResult};
use super::message::MessageRepresentation;

/// Identity of an external message, as referenced by interaction events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a message id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-instance creation options, passed through to `MessageHost::send`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Text-to-speech
    #[serde(default)]
    pub tts: bool,

    /// Visible only to the user being replied to
    #[serde(default)]
    pub ephemeral: bool,

    /// Interaction or message this instance replies to
    pub reply_reference: Option<String>,
}

impl SendOptions {
    /// Reply-style options
    pub fn reply(reference: impl Into<String>) -> Self {
        Self {
            reply_reference: Some(reference.into()),
            ..Self::default()
        }
    }

    /// Check option combinations the host would reject
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ephemeral && self.reply_reference.is_none() {
            return Err(ConfigError::InvalidSendOptions(
                "ephemeral is only valid for replies".to_string(),
            ));
        }
        Ok(())
    }
}

/// A live message on the chat service
pub trait ExternalMessage: Send + Sync {
    /// Identity used to route interactions back to this message
    fn id(&self) -> MessageId;

    /// Replace the message with a new representation
    fn edit(&self, message: MessageRepresentation) -> BoxFuture<'_, HostResult<()>>;

    /// Disable every control, leaving content and embeds as they are
    fn disable_components(&self) -> BoxFuture<'_, HostResult<()>>;

    /// Delete the message
    fn delete(&self) -> BoxFuture<'_, HostResult<()>>;
}

/// Chat service endpoint that creates messages
pub trait MessageHost: Send + Sync {
    /// Send a new message and return a handle to it
    fn send(
        &self,
        message: MessageRepresentation,
        options: SendOptions,
    ) -> BoxFuture<'_, HostResult<Arc<dyn ExternalMessage>>>;
}

/// Run a host future, mapping an elapsed timeout to `HostError::Timeout`
pub(crate) async fn with_timeout<T>(
    operation: &'static str,
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = HostResult<T>>,
) -> HostResult<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(HostError::Timeout { operation })),
        None => fut.await,
    }
}

/// Operation recorded by `MemoryHost`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    /// Message created
    Send {
        /// New message
        id: MessageId,
        /// Initial representation
        message: MessageRepresentation,
        /// Options given to send
        options: SendOptions,
    },
    /// Message edited
    Edit {
        /// Edited message
        id: MessageId,
        /// New representation
        message: MessageRepresentation,
    },
    /// Controls disabled
    Disable {
        /// Affected message
        id: MessageId,
    },
    /// Message deleted
    Delete {
        /// Deleted message
        id: MessageId,
    },
}

#[derive(Default)]
struct MemoryState {
    messages: HashMap<MessageId, MessageRepresentation>,
    log: Vec<HostOp>,
    next_id: u64,
    fail_edits: usize,
    fail_deletes: usize,
    slow_edits: usize,
    slow_latency: Duration,
}

struct MemoryInner {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryInner {
    async fn delay(&self) {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }
}

/// In-memory message host that records every operation
#[derive(Clone)]
pub struct MemoryHost {
    inner: Arc<MemoryInner>,
}

impl MemoryHost {
    /// Host whose operations complete after a single scheduler yield
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Host whose operations each take `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self::build(Some(latency))
    }

    fn build(latency: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: Mutex::new(MemoryState::default()),
                latency,
            }),
        }
    }

    /// Make the next `count` edits fail
    pub fn fail_next_edits(&self, count: usize) {
        self.inner.state.lock().fail_edits = count;
    }

    /// Make the next `count` deletes fail, leaving the message in place
    pub fn fail_next_deletes(&self, count: usize) {
        self.inner.state.lock().fail_deletes = count;
    }

    /// Make the next `count` edits take `latency` instead of the host default
    pub fn delay_next_edits(&self, count: usize, latency: Duration) {
        let mut state = self.inner.state.lock();
        state.slow_edits = count;
        state.slow_latency = latency;
    }

    /// Current contents of a live message
    pub fn message(&self, id: &MessageId) -> Option<MessageRepresentation> {
        self.inner.state.lock().messages.get(id).cloned()
    }

    /// Every recorded operation, oldest first
    pub fn operations(&self) -> Vec<HostOp> {
        self.inner.state.lock().log.clone()
    }

    /// Number of edits applied to a message
    pub fn edit_count(&self, id: &MessageId) -> usize {
        self.count(|op| matches!(op, HostOp::Edit { id: op_id, .. } if op_id == id))
    }

    /// Number of disable operations applied to a message
    pub fn disable_count(&self, id: &MessageId) -> usize {
        self.count(|op| matches!(op, HostOp::Disable { id: op_id } if op_id == id))
    }

    /// Number of deletions applied to a message
    pub fn delete_count(&self, id: &MessageId) -> usize {
        self.count(|op| matches!(op, HostOp::Delete { id: op_id } if op_id == id))
    }

    fn count(&self, predicate: impl Fn(&HostOp) -> bool) -> usize {
        self.inner.state.lock().log.iter().filter(|op| predicate(op)).count()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHost for MemoryHost {
    fn send(
        &self,
        message: MessageRepresentation,
        options: SendOptions,
    ) -> BoxFuture<'_, HostResult<Arc<dyn ExternalMessage>>> {
        Box::pin(async move {
            self.inner.delay().await;
            let mut state = self.inner.state.lock();
            state.next_id += 1;
            let id = MessageId(format!("msg-{}", state.next_id));
            state.messages.insert(id.clone(), message.clone());
            state.log.push(HostOp::Send {
                id: id.clone(),
                message,
                options,
            });
            let handle: Arc<dyn ExternalMessage> = Arc::new(MemoryMessage {
                id,
                inner: self.inner.clone(),
            });
            Ok(handle)
        })
    }
}

struct MemoryMessage {
    id: MessageId,
    inner: Arc<MemoryInner>,
}

impl MemoryMessage {
    fn missing(&self, operation: &'static str) -> HostError {
        HostError::OperationFailed {
            operation,
            detail: format!("unknown message {}", self.id),
        }
    }
}

impl ExternalMessage for MemoryMessage {
    fn id(&self) -> MessageId {
        self.id.clone()
    }

    fn edit(&self, message: MessageRepresentation) -> BoxFuture<'_, HostResult<()>> {
        Box::pin(async move {
            let slow = {
                let mut state = self.inner.state.lock();
                (state.slow_edits > 0).then(|| {
                    state.slow_edits -= 1;
                    state.slow_latency
                })
            };
            match slow {
                Some(latency) => tokio::time::sleep(latency).await,
                None => self.inner.delay().await,
            }
            let mut state = self.inner.state.lock();
            if state.fail_edits > 0 {
                state.fail_edits -= 1;
                return Err(HostError::OperationFailed {
                    operation: "edit",
                    detail: "injected failure".to_string(),
                });
            }
            let Some(current) = state.messages.get_mut(&self.id) else {
                return Err(self.missing("edit"));
            };
            *current = message.clone();
            state.log.push(HostOp::Edit {
                id: self.id.clone(),
                message,
            });
            Ok(())
        })
    }

    fn disable_components(&self) -> BoxFuture<'_, HostResult<()>> {
        Box::pin(async move {
            self.inner.delay().await;
            let mut state = self.inner.state.lock();
            let Some(current) = state.messages.get_mut(&self.id) else {
                return Err(self.missing("disable"));
            };
            *current = current.with_all_disabled();
            state.log.push(HostOp::Disable {
                id: self.id.clone(),
            });
            Ok(())
        })
    }

    fn delete(&self) -> BoxFuture<'_, HostResult<()>> {
        Box::pin(async move {
            self.inner.delay().await;
            let mut state = self.inner.state.lock();
            if state.fail_deletes > 0 {
                state.fail_deletes -= 1;
                return Err(HostError::OperationFailed {
                    operation: "delete",
                    detail: "injected failure".to_string(),
                });
            }
            state.log.push(HostOp::Delete {
                id: self.id.clone(),
            });
            match state.messages.remove(&self.id) {
                Some(_) => Ok(()),
                None => Err(self.missing("delete")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_requires_reply() {
        let options = SendOptions {
            ephemeral: true,
            ..SendOptions::default()
        };
        assert!(options.validate().is_err());

        let reply = SendOptions {
            ephemeral: true,
            ..SendOptions::reply("interaction-1")
        };
        assert!(reply.validate().is_ok());
    }

    #[tokio::test]
    async fn test_memory_host_records_operations() {
        let host = MemoryHost::new();
        let handle = host
            .send(MessageRepresentation::text("a"), SendOptions::default())
            .await
            .unwrap();
        let id = handle.id();

        handle.edit(MessageRepresentation::text("b")).await.unwrap();
        assert_eq!(host.message(&id).unwrap().content, "b");

        handle.delete().await.unwrap();
        assert!(host.message(&id).is_none());
        assert_eq!(host.edit_count(&id), 1);
        assert_eq!(host.delete_count(&id), 1);
        assert_eq!(host.operations().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_edit_failure() {
        let host = MemoryHost::new();
        let handle = host
            .send(MessageRepresentation::text("a"), SendOptions::default())
            .await
            .unwrap();
        host.fail_next_edits(1);

        assert!(handle.edit(MessageRepresentation::text("b")).await.is_err());
        assert!(handle.edit(MessageRepresentation::text("c")).await.is_ok());
        assert_eq!(host.message(&handle.id()).unwrap().content, "c");
    }

    #[tokio::test]
    async fn test_injected_delete_failure_keeps_message() {
        let host = MemoryHost::new();
        let handle = host
            .send(MessageRepresentation::text("a"), SendOptions::default())
            .await
            .unwrap();
        host.fail_next_deletes(1);

        assert!(handle.delete().await.is_err());
        assert!(host.message(&handle.id()).is_some());
        assert_eq!(host.delete_count(&handle.id()), 0);

        handle.delete().await.unwrap();
        assert!(host.message(&handle.id()).is_none());
    }
}
