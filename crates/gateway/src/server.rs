use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    relaydesk_agents::{ConversationBuffers, OpenAiResponder},
    relaydesk_channels::ChannelOutbound,
    relaydesk_common::ChatId,
    relaydesk_config::{RelaydeskConfig, TelegramConfig},
    relaydesk_routing::{ChatRouter, Collaborators},
    relaydesk_sessions::{SqliteChatModeStore, SqliteDialogueStore, open_pool},
    relaydesk_telegram::{TelegramOutbound, parse_update, register_webhook},
    secrecy::Secret,
    sqlx::SqlitePool,
    tower_http::trace::TraceLayer,
    tracing::{debug, error, info, warn},
};

use crate::state::{DedupeCache, GatewayState};

// ── Wiring ───────────────────────────────────────────────────────────────────

/// Build the Telegram outbound adapter from config.
pub fn telegram_outbound(config: &TelegramConfig) -> anyhow::Result<TelegramOutbound> {
    let token = config
        .token
        .clone()
        .context("telegram.token is not configured")?;
    let mut outbound = TelegramOutbound::new(&Secret::new(token));
    if let Some(api_url) = &config.api_url {
        let url = reqwest::Url::parse(api_url)
            .with_context(|| format!("invalid telegram.api_url: {api_url}"))?;
        outbound = outbound.with_api_url(url);
    }
    Ok(outbound)
}

/// Build the router and its collaborators on top of an open database.
pub fn build_router(
    config: &RelaydeskConfig,
    pool: &SqlitePool,
    outbound: Arc<dyn ChannelOutbound>,
) -> anyhow::Result<ChatRouter> {
    let operator = config
        .telegram
        .operator_chat_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .context("telegram.operator_chat_id is not configured")?;

    let responder = OpenAiResponder::new(config.responder.api_key.clone().map(Secret::new))
        .with_base_url(config.responder.base_url.clone())
        .with_model(config.responder.model.clone())
        .with_timeout(config.responder.timeout());
    if !responder.is_configured() {
        warn!("responder api key is not set, every bot-mode message gets the fallback reply");
    }

    let buffers = ConversationBuffers::new(config.responder.max_history_turns)
        .with_system_prompt(config.responder.system_prompt.clone());

    let router = ChatRouter::new(
        ChatId::new(operator),
        Collaborators {
            modes: Arc::new(SqliteChatModeStore::new(pool.clone())),
            dialogues: Arc::new(SqliteDialogueStore::new(pool.clone())),
            responder: Arc::new(responder),
            outbound,
        },
        config.texts.clone(),
    )
    .with_buffers(buffers)
    .with_responder_timeout(config.responder.timeout())
    .with_send_timeout(config.router.send_timeout());

    Ok(router)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>, webhook_path: &str) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(webhook_path, post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn start_gateway(config: RelaydeskConfig) -> anyhow::Result<()> {
    config.validate()?;

    let database_url = config.database_url();
    let pool = open_pool(&database_url)
        .await
        .with_context(|| format!("failed to open database {database_url}"))?;

    let outbound = Arc::new(telegram_outbound(&config.telegram)?);
    let router = build_router(&config, &pool, outbound.clone())?;
    let dedupe = DedupeCache::new(
        config.router.dedupe_ttl(),
        config.router.dedupe_max_entries,
    );
    let state = GatewayState::new(router, pool, dedupe);

    let webhook = match &config.telegram.public_url {
        Some(public_url) => {
            match register_webhook(outbound.bot(), public_url, &config.server.webhook_path).await
            {
                Ok(url) => url.to_string(),
                Err(e) => {
                    warn!(error = %e, "webhook registration failed, continuing without it");
                    "registration failed".to_string()
                },
            }
        },
        None => "not registered (no public_url)".to_string(),
    };

    let app = build_gateway_app(Arc::clone(&state), &config.server.webhook_path);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("relaydesk gateway v{}", state.version),
        format!(
            "listening on {addr}, webhook path {}",
            config.server.webhook_path
        ),
        format!("webhook: {webhook}"),
        format!("operator chat: {}", state.router.operator_chat_id()),
        format!(
            "responder: {} @ {}",
            config.responder.model, config.responder.base_url
        ),
        format!("database: {database_url}"),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if database { "ok" } else { "degraded" },
            "version": state.version,
            "database": database,
        })),
    )
}

/// Always acknowledges, except when persistence failed: then the platform's
/// redelivery is the only recovery, so the update must not look handled.
async fn webhook_handler(State(state): State<Arc<GatewayState>>, body: Bytes) -> StatusCode {
    let event = match parse_update(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "discarding unusable update");
            return StatusCode::OK;
        },
    };

    if let Some(id) = &event.event_id
        && state.dedupe.lock().await.check_and_insert(id)
    {
        debug!(update_id = %id, "duplicate delivery ignored");
        return StatusCode::OK;
    }

    match state.router.handle(&event).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            error!(chat_id = %event.chat_id, error = %e, "event aborted");
            if let Some(id) = &event.event_id {
                state.dedupe.lock().await.forget(id);
            }
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}
