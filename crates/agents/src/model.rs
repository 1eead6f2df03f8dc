use {
    async_trait::async_trait,
    relaydesk_common::UpstreamError,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Language-model responder (OpenAI-compatible APIs, test doubles).
#[async_trait]
pub trait ResponderClient: Send + Sync {
    fn name(&self) -> &str;

    /// Send the accumulated `conversation` followed by `new_text` as a user
    /// turn; return the next assistant turn's text.
    async fn send_and_get_reply(
        &self,
        conversation: &[Turn],
        new_text: &str,
    ) -> Result<String, UpstreamError>;
}
