use {
    async_trait::async_trait,
    relaydesk_common::{ChatId, TransportError},
    serde::Serialize,
};

/// How the platform should interpret the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    /// Lightweight markup (bold, italics, code).
    Markdown,
    /// Delivered verbatim. Used for any text we did not write ourselves.
    Plain,
}

/// A persistent single-row keyboard with one labeled button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyKeyboard {
    pub label: String,
}

impl ReplyKeyboard {
    pub fn single(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub format: TextFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<ReplyKeyboard>,
}

impl OutboundMessage {
    /// Markup text without a keyboard.
    pub fn markup(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            format: TextFormat::Markdown,
            keyboard: None,
        }
    }

    /// Verbatim text without a keyboard.
    pub fn plain(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            format: TextFormat::Plain,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: ReplyKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Deliver messages to a messaging platform.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Channel identifier (e.g. "telegram").
    fn id(&self) -> &str;

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_pick_payload_shape() {
        let chat = ChatId::new("1");
        let m = OutboundMessage::markup(chat.clone(), "*hi*")
            .with_keyboard(ReplyKeyboard::single("Connect operator"));
        assert_eq!(m.format, TextFormat::Markdown);
        assert_eq!(m.keyboard.as_ref().map(|k| k.label.as_str()), Some("Connect operator"));

        let p = OutboundMessage::plain(chat, "a_b*c");
        assert_eq!(p.format, TextFormat::Plain);
        assert!(p.keyboard.is_none());
    }

    #[test]
    fn serializes_without_empty_keyboard() {
        let json = serde_json::to_value(OutboundMessage::plain(ChatId::new("7"), "x")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"chat_id": "7", "text": "x", "format": "plain"})
        );
    }
}
