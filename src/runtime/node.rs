//! Host tree nodes produced by the reconciliation engine
//!
//! A snapshot is an ordered `Vec<HostNode>`. Interactive nodes may carry a
//! `Handler`; handlers are opaque to translation and only reach the
//! interaction router through the handler table.

use std::fmt;
use std::sync::Arc;

use super::message::{ButtonStyle, Embed, SelectOption};
use super::router::InteractionEvent;

/// A full render of the tree, top-level nodes in document order
pub type Snapshot = Vec<HostNode>;

/// Callback attached to an interactive node
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&InteractionEvent) + Send + Sync>);

impl Handler {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&InteractionEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the handler
    pub fn call(&self, event: &InteractionEvent) {
        (self.0)(event)
    }

    /// True when both values refer to the same closure
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Button that reports clicks
#[derive(Debug, Clone, Default)]
pub struct ButtonNode {
    /// Interaction identifier, unique within a snapshot
    pub custom_id: String,
    /// Label text
    pub label: Option<String>,
    /// Visual style
    pub style: ButtonStyle,
    /// Disabled on this node only
    pub disabled: bool,
    /// Emoji before the label
    pub emoji: Option<String>,
    /// Click handler
    pub on_click: Option<Handler>,
}

/// Button that opens a URL
#[derive(Debug, Clone, Default)]
pub struct LinkNode {
    /// Target URL
    pub url: String,
    /// Label text
    pub label: Option<String>,
    /// Disabled on this node only
    pub disabled: bool,
    /// Emoji before the label
    pub emoji: Option<String>,
}

/// Select menu
#[derive(Debug, Clone, Default)]
pub struct SelectNode {
    /// Interaction identifier, unique within a snapshot
    pub custom_id: String,
    /// Ordered choices
    pub options: Vec<SelectOption>,
    /// Placeholder text
    pub placeholder: Option<String>,
    /// Minimum number of selected values
    pub min_values: Option<u8>,
    /// Maximum number of selected values
    pub max_values: Option<u8>,
    /// Disabled on this node only
    pub disabled: bool,
    /// Selection handler
    pub on_select: Option<Handler>,
}

/// Node in a host tree snapshot
#[derive(Debug, Clone)]
pub enum HostNode {
    /// Run of message text
    Text(String),
    /// Embed block
    Embed(Embed),
    /// Clickable button
    Button(ButtonNode),
    /// URL button
    Link(LinkNode),
    /// Select menu
    Select(SelectNode),
    /// Explicit row boundary around interactive children
    Row(Vec<HostNode>),
}

impl HostNode {
    /// Text run
    pub fn text(value: impl Into<String>) -> Self {
        HostNode::Text(value.into())
    }

    /// Secondary-style button with a label and no handler
    pub fn button(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        HostNode::Button(ButtonNode {
            custom_id: custom_id.into(),
            label: Some(label.into()),
            ..ButtonNode::default()
        })
    }

    /// Button with a click handler
    pub fn button_with<F>(custom_id: impl Into<String>, label: impl Into<String>, on_click: F) -> Self
    where
        F: Fn(&InteractionEvent) + Send + Sync + 'static,
    {
        HostNode::Button(ButtonNode {
            custom_id: custom_id.into(),
            label: Some(label.into()),
            on_click: Some(Handler::new(on_click)),
            ..ButtonNode::default()
        })
    }

    /// Link button
    pub fn link(url: impl Into<String>, label: impl Into<String>) -> Self {
        HostNode::Link(LinkNode {
            url: url.into(),
            label: Some(label.into()),
            ..LinkNode::default()
        })
    }

    /// Select menu with a selection handler
    pub fn select_with<F>(custom_id: impl Into<String>, options: Vec<SelectOption>, on_select: F) -> Self
    where
        F: Fn(&InteractionEvent) + Send + Sync + 'static,
    {
        HostNode::Select(SelectNode {
            custom_id: custom_id.into(),
            options,
            on_select: Some(Handler::new(on_select)),
            ..SelectNode::default()
        })
    }

    /// Explicit row
    pub fn row(children: Vec<HostNode>) -> Self {
        HostNode::Row(children)
    }

    /// Whether this node becomes an action-row control
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            HostNode::Button(_) | HostNode::Link(_) | HostNode::Select(_)
        )
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            HostNode::Text(_) => "text",
            HostNode::Embed(_) => "embed",
            HostNode::Button(_) => "button",
            HostNode::Link(_) => "link",
            HostNode::Select(_) => "select",
            HostNode::Row(_) => "row",
        }
    }
}

impl From<Embed> for HostNode {
    fn from(embed: Embed) -> Self {
        HostNode::Embed(embed)
    }
}
