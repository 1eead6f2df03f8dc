use std::{sync::Arc, time::Duration};

use {
    relaydesk_channels::{ChannelOutbound, OutboundMessage, ReplyKeyboard},
    relaydesk_common::{ChatId, ChatMode, TransportError},
    relaydesk_config::TextsConfig,
    relaydesk_sessions::ChatModeStore,
    tracing::{debug, warn},
};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Mode-aware outbound delivery.
///
/// Failures are logged here and returned to the caller, who decides whether
/// anything else should happen; they are never retried.
pub struct MessageSender {
    outbound: Arc<dyn ChannelOutbound>,
    modes: Arc<dyn ChatModeStore>,
    connect_label: String,
    disconnect_label: String,
    timeout: Duration,
}

impl MessageSender {
    pub fn new(
        outbound: Arc<dyn ChannelOutbound>,
        modes: Arc<dyn ChatModeStore>,
        texts: &TextsConfig,
    ) -> Self {
        Self {
            outbound,
            modes,
            connect_label: texts.connect_operator.clone(),
            disconnect_label: texts.disconnect_operator.clone(),
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send markup text. With `with_mode_keyboard`, attach the button that
    /// toggles the chat's current mode.
    pub async fn send(
        &self,
        chat_id: &ChatId,
        text: &str,
        with_mode_keyboard: bool,
    ) -> Result<(), TransportError> {
        let mut message = OutboundMessage::markup(chat_id.clone(), text);
        if with_mode_keyboard && let Some(keyboard) = self.mode_keyboard(chat_id).await {
            message = message.with_keyboard(keyboard);
        }
        self.deliver(message).await
    }

    /// Send text verbatim, without markup or keyboard.
    pub async fn send_plain(&self, chat_id: &ChatId, text: &str) -> Result<(), TransportError> {
        self.deliver(OutboundMessage::plain(chat_id.clone(), text))
            .await
    }

    async fn mode_keyboard(&self, chat_id: &ChatId) -> Option<ReplyKeyboard> {
        match self.modes.get(chat_id).await {
            Ok(ChatMode::Bot) => Some(ReplyKeyboard::single(&self.connect_label)),
            Ok(ChatMode::Operator) => Some(ReplyKeyboard::single(&self.disconnect_label)),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "mode lookup failed, sending without keyboard");
                None
            },
        }
    }

    async fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let result = match tokio::time::timeout(self.timeout, self.outbound.deliver(&message)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => debug!(
                channel = self.outbound.id(),
                chat_id = %message.chat_id,
                "message delivered"
            ),
            Err(e) => warn!(
                channel = self.outbound.id(),
                chat_id = %message.chat_id,
                error = %e,
                "message delivery failed"
            ),
        }
        result
    }
}
