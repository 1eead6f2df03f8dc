//! Config schema (server, telegram, responder, storage, router, texts).

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaydeskConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub responder: ResponderConfig,
    pub storage: StorageConfig,
    pub router: RouterConfig,
    pub texts: TextsConfig,
}

impl fmt::Debug for RelaydeskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaydeskConfig")
            .field("server", &self.server)
            .field("telegram", &self.telegram)
            .field("responder", &self.responder)
            .field("storage", &self.storage)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Path the messaging platform posts updates to.
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            webhook_path: "/webhook/".into(),
        }
    }
}

/// Telegram bot settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    /// Chat that receives forwarded user messages and may relay replies.
    pub operator_chat_id: Option<String>,
    /// Public base URL; when set the webhook is registered on startup.
    pub public_url: Option<String>,
    /// Override the Bot API base URL (tests, local Bot API servers).
    pub api_url: Option<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("operator_chat_id", &self.operator_chat_id)
            .field("public_url", &self.public_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// OpenAI-compatible chat completion settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Kept at the head of every conversation.
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on user/assistant turns kept per chat.
    pub max_history_turns: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".into(),
            model: "gpt-4o-mini".into(),
            system_prompt: None,
            timeout_secs: 30,
            max_history_turns: 40,
        }
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .field("max_history_turns", &self.max_history_turns)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL. Defaults to `sqlite://<data_dir>/relaydesk.db`.
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub send_timeout_secs: u64,
    pub dedupe_ttl_secs: u64,
    pub dedupe_max_entries: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: 10,
            dedupe_ttl_secs: 600,
            dedupe_max_entries: 1000,
        }
    }
}

impl RouterConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_secs)
    }
}

/// User- and operator-facing strings.
///
/// Placeholders: `{chat_id}`, `{text}`, `{original}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextsConfig {
    pub welcome: String,
    /// Button label and command phrase that hands the chat to the operator.
    pub connect_operator: String,
    /// Button label and command phrase that hands the chat back to the bot.
    pub disconnect_operator: String,
    pub operator_connected: String,
    pub operator_disconnected: String,
    pub operator_notice_connected: String,
    pub operator_notice_disconnected: String,
    pub forwarded_message: String,
    pub forwarded_reply: String,
    pub operator_reply: String,
    pub relay_format_error: String,
    pub relay_delivery_failed: String,
    pub responder_fallback: String,
}

impl Default for TextsConfig {
    fn default() -> Self {
        Self {
            welcome: "Hi! I'm your new assistant. Ask me anything and I'll answer. \
                      Press the button to reach an operator. Your chat number is {chat_id}"
                .into(),
            connect_operator: "Connect operator".into(),
            disconnect_operator: "Disconnect operator".into(),
            operator_connected: "Operator connected. You can send your messages.".into(),
            operator_disconnected: "Operator disconnected. You are talking to the bot again."
                .into(),
            operator_notice_connected:
                "Message from user {chat_id}.\nReply in the format id: message".into(),
            operator_notice_disconnected: "User {chat_id} disconnected the operator".into(),
            forwarded_message: "Message from user {chat_id}.\n{text}".into(),
            forwarded_reply: "Message from user {chat_id}.\nReply to: {original}\n{text}".into(),
            operator_reply: "Operator reply: {text}".into(),
            relay_format_error: "Invalid message format. Use the format 'chat_id: message'."
                .into(),
            relay_delivery_failed: "Could not deliver the reply to chat {chat_id}.".into(),
            responder_fallback: "There was a problem reaching the assistant. \
                                 Please contact the operator."
                .into(),
        }
    }
}

/// Environment variables that override file values.
pub const ENV_TELEGRAM_TOKEN: &str = "RELAYDESK_TELEGRAM_TOKEN";
pub const ENV_OPERATOR_CHAT_ID: &str = "RELAYDESK_OPERATOR_CHAT_ID";
pub const ENV_PUBLIC_URL: &str = "RELAYDESK_PUBLIC_URL";
pub const ENV_OPENAI_API_KEY: &str = "RELAYDESK_OPENAI_API_KEY";
pub const ENV_MODEL: &str = "RELAYDESK_MODEL";
pub const ENV_DATABASE_URL: &str = "RELAYDESK_DATABASE_URL";

impl RelaydeskConfig {
    /// Apply `RELAYDESK_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_TELEGRAM_TOKEN) {
            self.telegram.token = Some(v);
        }
        if let Some(v) = get(ENV_OPERATOR_CHAT_ID) {
            self.telegram.operator_chat_id = Some(v.trim().to_string());
        }
        if let Some(v) = get(ENV_PUBLIC_URL) {
            self.telegram.public_url = Some(v);
        }
        if let Some(v) = get(ENV_OPENAI_API_KEY) {
            self.responder.api_key = Some(v);
        }
        if let Some(v) = get(ENV_MODEL) {
            self.responder.model = v;
        }
        if let Some(v) = get(ENV_DATABASE_URL) {
            self.storage.database_url = Some(v);
        }
    }

    /// Check the settings the gateway cannot run without.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            anyhow::bail!("telegram.token is not set (or {ENV_TELEGRAM_TOKEN})");
        }
        let Some(operator) = self
            .telegram
            .operator_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            anyhow::bail!("telegram.operator_chat_id is not set (or {ENV_OPERATOR_CHAT_ID})");
        };
        // Inbound chat ids are always numeric, so anything else never matches.
        if operator.parse::<i64>().is_err() {
            anyhow::bail!("telegram.operator_chat_id must be a numeric chat id: '{operator}'");
        }
        if !self.server.webhook_path.starts_with('/') {
            anyhow::bail!(
                "server.webhook_path must start with '/': {}",
                self.server.webhook_path
            );
        }
        Ok(())
    }

    /// Resolved SQLite URL.
    pub fn database_url(&self) -> String {
        self.storage.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}",
                crate::loader::data_dir().join("relaydesk.db").display()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelaydeskConfig {
        let mut cfg = RelaydeskConfig::default();
        cfg.telegram.token = Some("123:abc".into());
        cfg.telegram.operator_chat_id = Some("42".into());
        cfg
    }

    #[test]
    fn defaults_are_usable() {
        let cfg = RelaydeskConfig::default();
        assert_eq!(cfg.server.webhook_path, "/webhook/");
        assert_eq!(cfg.responder.max_history_turns, 40);
        assert!(cfg.texts.welcome.contains("{chat_id}"));
    }

    #[test]
    fn validate_requires_token_and_operator() {
        assert!(RelaydeskConfig::default().validate().is_err());

        let mut cfg = valid();
        assert!(cfg.validate().is_ok());

        cfg.telegram.operator_chat_id = Some("  ".into());
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("operator_chat_id"));
    }

    #[test]
    fn validate_requires_numeric_operator() {
        let mut cfg = valid();
        cfg.telegram.operator_chat_id = Some(" -100900 ".into());
        assert!(cfg.validate().is_ok());

        cfg.telegram.operator_chat_id = Some("@ops".into());
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("numeric"));
    }

    #[test]
    fn validate_rejects_relative_webhook_path() {
        let mut cfg = valid();
        cfg.server.webhook_path = "webhook".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = valid();
        cfg.apply_overrides_from(|name| match name {
            ENV_OPERATOR_CHAT_ID => Some(" 777 ".into()),
            ENV_MODEL => Some("gpt-4o".into()),
            ENV_OPENAI_API_KEY => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.telegram.operator_chat_id.as_deref(), Some("777"));
        assert_eq!(cfg.responder.model, "gpt-4o");
        assert!(cfg.responder.api_key.is_none());
        assert_eq!(cfg.telegram.token.as_deref(), Some("123:abc"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut cfg = valid();
        cfg.responder.api_key = Some("sk-secret".into());
        let out = format!("{cfg:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("sk-secret"));
        assert!(!out.contains("123:abc"));
    }

    #[test]
    fn explicit_database_url_wins() {
        let mut cfg = valid();
        cfg.storage.database_url = Some("sqlite::memory:".into());
        assert_eq!(cfg.database_url(), "sqlite::memory:");
    }
}
