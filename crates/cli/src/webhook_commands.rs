use {
    anyhow::{Context, Result},
    clap::Subcommand,
    relaydesk_channels::{ChannelOutbound, OutboundMessage},
    relaydesk_common::ChatId,
    relaydesk_config::RelaydeskConfig,
    relaydesk_gateway::telegram_outbound,
    relaydesk_routing::render,
    relaydesk_telegram::{delete_webhook, register_webhook},
};

#[derive(Subcommand)]
pub enum WebhookAction {
    /// Register `<public_url><webhook_path>` with the Bot API.
    Set {
        /// Overrides `telegram.public_url`.
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove the registered webhook.
    Delete,
}

pub async fn handle_webhook(action: WebhookAction, config: &RelaydeskConfig) -> Result<()> {
    let outbound = telegram_outbound(&config.telegram)?;
    match action {
        WebhookAction::Set { url } => {
            let public_url = url
                .or_else(|| config.telegram.public_url.clone())
                .context("no public url: pass --url or set telegram.public_url")?;
            let registered =
                register_webhook(outbound.bot(), &public_url, &config.server.webhook_path).await?;
            println!("Webhook set to {registered}");
        },
        WebhookAction::Delete => {
            delete_webhook(outbound.bot()).await?;
            println!("Webhook deleted");
        },
    }
    Ok(())
}

/// Deliver an operator reply to `to` directly, bypassing the webhook.
pub async fn send_operator_reply(config: &RelaydeskConfig, to: &str, message: &str) -> Result<()> {
    let outbound = telegram_outbound(&config.telegram)?;
    let text = operator_reply_text(config, message)?;
    outbound
        .deliver(&OutboundMessage::plain(ChatId::new(to), text))
        .await?;
    println!("Sent to {to}");
    Ok(())
}

fn operator_reply_text(config: &RelaydeskConfig, message: &str) -> Result<String> {
    let body = message.trim();
    anyhow::ensure!(!body.is_empty(), "message is empty");
    Ok(render(&config.texts.operator_reply, &[("text", body)]))
}
