//! Inbound webhook payloads.
//!
//! Only the fields the router needs are modelled; everything else in the
//! update is ignored.

use {
    relaydesk_common::{ChatId, InboundEvent, MalformedInputError},
    serde::Deserialize,
};

#[derive(Debug, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub chat: WebhookChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<RepliedMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RepliedMessage {
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookUpdate {
    /// Extract the router-facing event.
    pub fn into_event(self) -> Result<InboundEvent, MalformedInputError> {
        let message = self
            .message
            .ok_or(MalformedInputError::MissingField("message"))?;

        let text = message
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(MalformedInputError::MissingField("message.text"))?
            .to_string();

        let reply_to_text = message
            .reply_to_message
            .and_then(|r| r.text)
            .filter(|t| !t.trim().is_empty());

        Ok(InboundEvent {
            event_id: self.update_id.map(|id| id.to_string()),
            chat_id: ChatId::from(message.chat.id),
            text,
            reply_to_text,
        })
    }
}

/// Parse a raw webhook body into an [`InboundEvent`].
pub fn parse_update(body: &[u8]) -> Result<InboundEvent, MalformedInputError> {
    let update: WebhookUpdate = serde_json::from_slice(body)
        .map_err(|e| MalformedInputError::InvalidPayload(e.to_string()))?;
    update.into_event()
}
