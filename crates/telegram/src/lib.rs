//! Telegram adapter: webhook update parsing, message delivery through the
//! Bot API, and webhook registration.

pub mod outbound;
pub mod update;
pub mod webhook;

pub use {
    outbound::TelegramOutbound,
    update::{WebhookUpdate, parse_update},
    webhook::{delete_webhook, register_webhook, webhook_url},
};
