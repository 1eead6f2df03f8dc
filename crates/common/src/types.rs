use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Opaque identifier of one end-user conversation channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Who handles inbound text for a chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// The automated responder answers.
    #[default]
    Bot,
    /// Text is forwarded to the human operator.
    Operator,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored or user-supplied mode is not `bot` or `operator`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chat mode '{0}' (expected 'bot' or 'operator')")]
pub struct UnknownChatMode(pub String);

impl FromStr for ChatMode {
    type Err = UnknownChatMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bot" => Ok(Self::Bot),
            "operator" => Ok(Self::Operator),
            _ => Err(UnknownChatMode(s.to_string())),
        }
    }
}

/// One inbound message, already extracted from the transport payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Transport-level delivery id, used to drop redelivered events.
    pub event_id: Option<String>,
    pub chat_id: ChatId,
    /// Trimmed message text.
    pub text: String,
    /// Text of the message this one replies to, when the transport provides it.
    pub reply_to_text: Option<String>,
}

impl InboundEvent {
    pub fn new(chat_id: impl Into<ChatId>, text: impl Into<String>) -> Self {
        Self {
            event_id: None,
            chat_id: chat_id.into(),
            text: text.into(),
            reply_to_text: None,
        }
    }

    pub fn with_reply_to(mut self, original: impl Into<String>) -> Self {
        self.reply_to_text = Some(original.into());
        self
    }

    pub fn with_event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }
}
