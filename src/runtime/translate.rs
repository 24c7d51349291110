//! Snapshot translation
//!
//! Turns an ordered host-node snapshot into a `MessageRepresentation` and the
//! handler table for that snapshot. Translation is pure and deterministic;
//! the only failures are structural limits, duplicate custom ids and invalid
//! nesting.

use std::collections::{HashMap, HashSet};

use super::error::{Limit, TranslateError, TranslateResult};
use super::message::{ActionRow, Component, Embed, MessageLimits, MessageRepresentation};
use super::node::{Handler, HostNode};

/// Mapping from custom id to the handler attached in one snapshot
pub type HandlerTable = HashMap<String, Handler>;

/// Output of translating one snapshot
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Concrete message
    pub message: MessageRepresentation,
    /// Handlers keyed by custom id
    pub handlers: HandlerTable,
}

/// Translate a snapshot into a message representation
pub fn translate(snapshot: &[HostNode], limits: &MessageLimits) -> TranslateResult<MessageRepresentation> {
    render(snapshot, limits).map(|rendered| rendered.message)
}

/// Translate a snapshot and collect its handler table
pub fn render(snapshot: &[HostNode], limits: &MessageLimits) -> TranslateResult<Rendered> {
    let mut builder = Builder::new(limits);
    for node in snapshot {
        builder.visit(node)?;
    }
    builder.finish()
}

struct Builder<'a> {
    limits: &'a MessageLimits,
    content: String,
    embeds: Vec<Embed>,
    rows: Vec<ActionRow>,
    /// Auto-packed row being filled, with its used width
    open: Vec<Component>,
    open_width: usize,
    handlers: HandlerTable,
    custom_ids: HashSet<String>,
}

impl<'a> Builder<'a> {
    fn new(limits: &'a MessageLimits) -> Self {
        Self {
            limits,
            content: String::new(),
            embeds: Vec::new(),
            rows: Vec::new(),
            open: Vec::new(),
            open_width: 0,
            handlers: HashMap::new(),
            custom_ids: HashSet::new(),
        }
    }

    fn visit(&mut self, node: &HostNode) -> TranslateResult<()> {
        match node {
            HostNode::Text(value) => self.content.push_str(value),
            HostNode::Embed(embed) => self.embeds.push(embed.clone()),
            HostNode::Button(_) | HostNode::Link(_) | HostNode::Select(_) => {
                let (component, width) = self.control(node)?;
                if width >= self.limits.max_components_per_row {
                    self.close_open_row();
                    self.rows.push(ActionRow {
                        components: vec![component],
                    });
                } else {
                    if self.open_width + width > self.limits.max_components_per_row {
                        self.close_open_row();
                    }
                    self.open.push(component);
                    self.open_width += width;
                }
            }
            HostNode::Row(children) => {
                self.close_open_row();
                let mut components = Vec::with_capacity(children.len());
                let mut width = 0;
                for child in children {
                    if !child.is_interactive() {
                        return Err(TranslateError::InvalidNesting(format!(
                            "{} inside a row",
                            child.kind()
                        )));
                    }
                    let (component, child_width) = self.control(child)?;
                    components.push(component);
                    width += child_width;
                }
                if width > self.limits.max_components_per_row {
                    return Err(TranslateError::CapacityExceeded {
                        limit: Limit::ComponentsPerRow,
                        max: self.limits.max_components_per_row,
                        actual: width,
                    });
                }
                if !components.is_empty() {
                    self.rows.push(ActionRow { components });
                }
            }
        }
        Ok(())
    }

    /// Build the component for an interactive node, registering its id and handler
    fn control(&mut self, node: &HostNode) -> TranslateResult<(Component, usize)> {
        match node {
            HostNode::Button(button) => {
                self.claim(&button.custom_id, button.on_click.as_ref())?;
                let component = Component::Button {
                    custom_id: button.custom_id.clone(),
                    label: button.label.clone(),
                    style: button.style,
                    disabled: button.disabled,
                    emoji: button.emoji.clone(),
                };
                Ok((component, 1))
            }
            HostNode::Link(link) => {
                let component = Component::Link {
                    url: link.url.clone(),
                    label: link.label.clone(),
                    disabled: link.disabled,
                    emoji: link.emoji.clone(),
                };
                Ok((component, 1))
            }
            HostNode::Select(select) => {
                self.claim(&select.custom_id, select.on_select.as_ref())?;
                let component = Component::Select {
                    custom_id: select.custom_id.clone(),
                    options: select.options.clone(),
                    placeholder: select.placeholder.clone(),
                    min_values: select.min_values,
                    max_values: select.max_values,
                    disabled: select.disabled,
                };
                Ok((component, self.limits.max_components_per_row))
            }
            other => Err(TranslateError::InvalidNesting(format!(
                "{} is not an interactive node",
                other.kind()
            ))),
        }
    }

    fn claim(&mut self, custom_id: &str, handler: Option<&Handler>) -> TranslateResult<()> {
        if !self.custom_ids.insert(custom_id.to_string()) {
            return Err(TranslateError::DuplicateIdentifier(custom_id.to_string()));
        }
        if let Some(handler) = handler {
            self.handlers.insert(custom_id.to_string(), handler.clone());
        }
        Ok(())
    }

    fn close_open_row(&mut self) {
        if !self.open.is_empty() {
            let components = std::mem::take(&mut self.open);
            self.rows.push(ActionRow { components });
        }
        self.open_width = 0;
    }

    fn finish(mut self) -> TranslateResult<Rendered> {
        self.close_open_row();

        if self.embeds.len() > self.limits.max_embeds {
            return Err(TranslateError::CapacityExceeded {
                limit: Limit::Embeds,
                max: self.limits.max_embeds,
                actual: self.embeds.len(),
            });
        }
        if self.rows.len() > self.limits.max_rows {
            return Err(TranslateError::CapacityExceeded {
                limit: Limit::Rows,
                max: self.limits.max_rows,
                actual: self.rows.len(),
            });
        }

        Ok(Rendered {
            message: MessageRepresentation {
                content: self.content,
                embeds: self.embeds,
                action_rows: self.rows,
            },
            handlers: self.handlers,
        })
    }
}
