use {
    anyhow::Context,
    teloxide::{
        Bot,
        requests::{Request, Requester},
    },
    tracing::info,
};

/// Join the public base URL and the webhook path.
pub fn webhook_url(public_url: &str, path: &str) -> anyhow::Result<reqwest::Url> {
    let raw = format!(
        "{}/{}",
        public_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    reqwest::Url::parse(&raw).with_context(|| format!("invalid webhook url: {raw}"))
}

/// Drop any previous webhook, then point the bot at `<public_url><path>`.
pub async fn register_webhook(
    bot: &Bot,
    public_url: &str,
    path: &str,
) -> anyhow::Result<reqwest::Url> {
    let url = webhook_url(public_url, path)?;
    delete_webhook(bot).await?;
    bot.set_webhook(url.clone())
        .send()
        .await
        .context("setWebhook failed")?;
    info!(url = %url, "webhook registered");
    Ok(url)
}

pub async fn delete_webhook(bot: &Bot) -> anyhow::Result<()> {
    bot.delete_webhook()
        .send()
        .await
        .context("deleteWebhook failed")?;
    info!("webhook deleted");
    Ok(())
}
