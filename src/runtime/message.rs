//! Concrete message representation sent to the chat service
//!
//! A `MessageRepresentation` is the fully translated form of a snapshot:
//! content string, ordered embeds, and a grid of action rows. It is plain
//! data, compared structurally to elide no-op commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structural limits of the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLimits {
    /// Maximum embeds per message
    pub max_embeds: usize,

    /// Maximum action rows per message
    pub max_rows: usize,

    /// Width units available in one row (a button is 1, a select fills a row)
    pub max_components_per_row: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_embeds: 10,
            max_rows: 5,
            max_components_per_row: 5,
        }
    }
}

/// Visual style of a button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    /// Blurple call-to-action
    Primary,
    /// Grey
    #[default]
    Secondary,
    /// Green
    Success,
    /// Red
    Danger,
}

/// Field inside an embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    /// Field name
    pub name: String,
    /// Field value
    pub value: String,
    /// Render next to neighbouring inline fields
    #[serde(default)]
    pub inline: bool,
}

/// Embed author line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    /// Author name
    pub name: String,
    /// Optional link on the name
    pub url: Option<String>,
    /// Optional icon
    pub icon_url: Option<String>,
}

/// Embed footer line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    /// Footer text
    pub text: String,
    /// Optional icon
    pub icon_url: Option<String>,
}

/// Rich embed block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    /// Title line
    pub title: Option<String>,
    /// Body text
    pub description: Option<String>,
    /// Link on the title
    pub url: Option<String>,
    /// Side bar color as 0xRRGGBB
    pub color: Option<u32>,
    /// Ordered fields
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    /// Author line
    pub author: Option<EmbedAuthor>,
    /// Footer line
    pub footer: Option<EmbedFooter>,
    /// Large image
    pub image_url: Option<String>,
    /// Small image
    pub thumbnail_url: Option<String>,
    /// Timestamp shown in the footer
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    /// Embed with just a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    /// Set the color
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }
}

/// One choice in a select menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Visible label
    pub label: String,
    /// Value reported back on selection
    pub value: String,
    /// Secondary text
    pub description: Option<String>,
    /// Emoji shown before the label
    pub emoji: Option<String>,
    /// Pre-selected
    #[serde(default)]
    pub default: bool,
}

impl SelectOption {
    /// Option whose label and value are the same string
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: None,
            emoji: None,
            default: false,
        }
    }
}

/// Interactive control inside an action row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    /// Button that reports clicks by custom id
    Button {
        /// Interaction identifier
        custom_id: String,
        /// Label text
        label: Option<String>,
        /// Visual style
        style: ButtonStyle,
        /// Greyed out and unclickable
        disabled: bool,
        /// Emoji before the label
        emoji: Option<String>,
    },
    /// Button that opens a URL
    Link {
        /// Target URL
        url: String,
        /// Label text
        label: Option<String>,
        /// Greyed out and unclickable
        disabled: bool,
        /// Emoji before the label
        emoji: Option<String>,
    },
    /// Select menu
    Select {
        /// Interaction identifier
        custom_id: String,
        /// Ordered choices
        options: Vec<SelectOption>,
        /// Text shown when nothing is selected
        placeholder: Option<String>,
        /// Minimum number of selected values
        min_values: Option<u8>,
        /// Maximum number of selected values
        max_values: Option<u8>,
        /// Greyed out and unselectable
        disabled: bool,
    },
}

impl Component {
    /// Custom id of the control, if it reports interactions
    pub fn custom_id(&self) -> Option<&str> {
        match self {
            Component::Button { custom_id, .. } | Component::Select { custom_id, .. } => {
                Some(custom_id)
            }
            Component::Link { .. } => None,
        }
    }

    /// Whether the control is disabled
    pub fn is_disabled(&self) -> bool {
        match self {
            Component::Button { disabled, .. }
            | Component::Link { disabled, .. }
            | Component::Select { disabled, .. } => *disabled,
        }
    }

    fn disable(&mut self) {
        match self {
            Component::Button { disabled, .. }
            | Component::Link { disabled, .. }
            | Component::Select { disabled, .. } => *disabled = true,
        }
    }
}

/// Ordered controls sharing one row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRow {
    /// Controls, left to right
    pub components: Vec<Component>,
}

/// Translated message: what the external message should show
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRepresentation {
    /// Concatenated text content
    pub content: String,

    /// Embeds in document order
    pub embeds: Vec<Embed>,

    /// Action rows, top to bottom
    pub action_rows: Vec<ActionRow>,
}

impl MessageRepresentation {
    /// Message with text content only
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// True when the message shows nothing at all
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.embeds.is_empty() && self.action_rows.is_empty()
    }

    /// Iterate over every control in row order
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.action_rows.iter().flat_map(|row| row.components.iter())
    }

    /// Copy of this message with every control disabled
    ///
    /// Content and embeds are left untouched.
    pub fn with_all_disabled(&self) -> Self {
        let mut disabled = self.clone();
        for row in &mut disabled.action_rows {
            for component in &mut row.components {
                component.disable();
            }
        }
        disabled
    }

    /// Deterministic blake3 fingerprint of the canonical JSON encoding
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        // Plain data: serialization only fails on non-string map keys.
        if let Ok(bytes) = serde_json::to_vec(self) {
            hasher.update(&bytes);
        }
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}
