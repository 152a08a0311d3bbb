//! JSON shapes exchanged with the mail-flow hook.

use serde::{Deserialize, Serialize};

/// An inbound mail-flow invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    /// Identifier used to fetch and update the message.
    pub message_id: String,
    #[serde(default)]
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_direction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub mail_from: Option<EnvelopeAddress>,
    #[serde(default)]
    pub recipients: Vec<EnvelopeAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAddress {
    pub address: String,
}

impl InvocationEvent {
    /// Envelope sender, if the event carries one.
    pub fn sender(&self) -> Option<&str> {
        self.envelope
            .mail_from
            .as_ref()
            .map(|from| from.address.as_str())
    }
}

/// Reply to the mail-flow hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub actions: Vec<RecipientAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientAction {
    pub all_recipients: bool,
    pub action: FlowAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowAction {
    /// Continue normal delivery, with updated content if any was stored.
    Default,
}

impl FlowResponse {
    /// Deliver to every recipient with the default action.
    pub fn deliver() -> Self {
        Self {
            actions: vec![RecipientAction {
                all_recipients: true,
                action: FlowAction::Default,
            }],
        }
    }
}
