use std::fmt;

use {
    async_trait::async_trait,
    relaydesk_channels::{ChannelOutbound, OutboundMessage, ReplyKeyboard, TextFormat},
    relaydesk_common::{ChatId, TransportError},
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        Bot,
        payloads::SendMessageSetters,
        requests::{Request, Requester},
        types::{KeyboardButton, KeyboardMarkup, ParseMode, Recipient},
    },
    tracing::debug,
};

/// Delivers [`OutboundMessage`]s through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl fmt::Debug for TelegramOutbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramOutbound")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TelegramOutbound {
    pub fn new(token: &Secret<String>) -> Self {
        Self {
            bot: Bot::new(token.expose_secret()),
        }
    }

    /// Point the bot at another Bot API server.
    #[must_use]
    pub fn with_api_url(mut self, url: reqwest::Url) -> Self {
        self.bot = self.bot.set_api_url(url);
        self
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Numeric ids go to a chat, anything else is treated as a `@channel` name.
pub(crate) fn recipient(chat_id: &ChatId) -> Recipient {
    match chat_id.as_str().parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.as_str().to_string()),
    }
}

pub(crate) fn keyboard_markup(keyboard: &ReplyKeyboard) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(keyboard.label.clone())]]).resize_keyboard()
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_message(recipient(&message.chat_id), message.text.clone());

        if message.format == TextFormat::Markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }
        if let Some(keyboard) = &message.keyboard {
            request = request.reply_markup(keyboard_markup(keyboard));
        }

        request
            .send()
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        debug!(chat_id = %message.chat_id, format = ?message.format, "telegram message sent");
        Ok(())
    }
}
