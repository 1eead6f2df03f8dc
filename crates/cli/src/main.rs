mod dialogue_commands;
mod webhook_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    relaydesk_config::RelaydeskConfig,
    sqlx::SqlitePool,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "relaydesk",
    about = "Relaydesk: chat gateway between an LLM responder and a human operator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Only look for relaydesk.{toml,yaml,yml,json} in this directory.
    #[arg(long, global = true, env = "RELAYDESK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Webhook registration.
    Webhook {
        #[command(subcommand)]
        action: webhook_commands::WebhookAction,
    },
    /// Send an operator reply to a chat.
    Send {
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
    /// Inspect stored dialogues.
    Dialogues {
        #[command(subcommand)]
        action: dialogue_commands::DialogueAction,
    },
    /// Inspect or override a chat's mode.
    Mode {
        #[command(subcommand)]
        action: dialogue_commands::ModeAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn open_database(config: &RelaydeskConfig) -> anyhow::Result<SqlitePool> {
    let url = config.database_url();
    relaydesk_sessions::open_pool(&url)
        .await
        .with_context(|| format!("failed to open database {url}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = cli.config_dir.clone() {
        relaydesk_config::set_config_dir(dir);
    }
    let mut config = relaydesk_config::discover_and_load();

    info!(version = env!("CARGO_PKG_VERSION"), "relaydesk starting");

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            relaydesk_gateway::start_gateway(config).await
        },
        Commands::Webhook { action } => webhook_commands::handle_webhook(action, &config).await,
        Commands::Send { to, message } => {
            webhook_commands::send_operator_reply(&config, &to, &message).await
        },
        Commands::Dialogues { action } => {
            let pool = open_database(&config).await?;
            dialogue_commands::handle_dialogues(action, &pool).await
        },
        Commands::Mode { action } => {
            let pool = open_database(&config).await?;
            dialogue_commands::handle_mode(action, &pool).await
        },
    }
}
