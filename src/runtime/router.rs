//! Interaction routing
//!
//! Delivers inbound interaction events to the handler attached to the
//! control in the owning instance's last committed snapshot. Unknown
//! messages and stale custom ids are races of asynchronous delivery; they
//! are logged and ignored, never raised.

use serde::{Deserialize, Serialize};

use super::error::RouteError;
use super::host::MessageId;
use super::registry::Registry;

/// Kind of control that produced an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Button click
    Button,
    /// Select menu choice
    Select,
}

/// Data carried by an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionPayload {
    /// Control kind
    pub kind: InteractionKind,
    /// Selected values, for select menus
    #[serde(default)]
    pub values: Vec<String>,
    /// User who interacted
    pub user_id: Option<String>,
    /// Raw event from the chat service, untouched
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Inbound interaction on a message control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Message the control belongs to
    pub message_id: MessageId,
    /// Custom id of the control
    pub custom_id: String,
    /// Event data
    pub payload: InteractionPayload,
}

impl InteractionEvent {
    /// Button click event
    pub fn button(message_id: MessageId, custom_id: impl Into<String>) -> Self {
        Self {
            message_id,
            custom_id: custom_id.into(),
            payload: InteractionPayload {
                kind: InteractionKind::Button,
                values: Vec::new(),
                user_id: None,
                raw: serde_json::Value::Null,
            },
        }
    }

    /// Select menu event
    pub fn select(message_id: MessageId, custom_id: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            message_id,
            custom_id: custom_id.into(),
            payload: InteractionPayload {
                kind: InteractionKind::Select,
                values,
                user_id: None,
                raw: serde_json::Value::Null,
            },
        }
    }

    /// Attach the interacting user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.payload.user_id = Some(user_id.into());
        self
    }
}

/// What happened to a dispatched interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran
    Handled,
    /// Dropped without running anything
    Ignored(RouteError),
}

impl Dispatch {
    /// True when a handler ran
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled)
    }
}

/// Resolve the owning instance and handler, then run the handler
///
/// The handler runs synchronously; any render it requests is not awaited.
pub(crate) fn dispatch(registry: &Registry, event: &InteractionEvent) -> Dispatch {
    let handler = registry
        .lookup(&event.message_id)
        .ok_or_else(|| RouteError::UnknownInstance(event.message_id.to_string()))
        .and_then(|instance| instance.handler(&event.custom_id));

    match handler {
        Ok(handler) => {
            handler.call(event);
            Dispatch::Handled
        }
        Err(reason) => {
            tracing::debug!(
                "Ignoring interaction {} on message {}: {}",
                event.custom_id,
                event.message_id,
                reason
            );
            Dispatch::Ignored(reason)
        }
    }
}
