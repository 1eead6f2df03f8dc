use {
    anyhow::Result,
    clap::Subcommand,
    relaydesk_common::{ChatId, ChatMode},
    relaydesk_sessions::{
        ChatModeStore, DialogueStore, DialogueSummary, MessageRecord, SqliteChatModeStore,
        SqliteDialogueStore,
    },
    sqlx::SqlitePool,
    time::{OffsetDateTime, format_description::well_known::Rfc3339},
};

#[derive(Subcommand)]
pub enum DialogueAction {
    /// List every chat with a stored dialogue.
    List,
    /// Print a chat's message log, oldest first.
    History { chat_id: String },
}

#[derive(Subcommand)]
pub enum ModeAction {
    /// Show whether a chat is handled by the bot or the operator.
    Get { chat_id: String },
    /// Force a chat into a mode.
    Set { chat_id: String, mode: ChatMode },
}

pub async fn handle_dialogues(action: DialogueAction, pool: &SqlitePool) -> Result<()> {
    let store = SqliteDialogueStore::new(pool.clone());
    match action {
        DialogueAction::List => {
            let dialogues = store.list_dialogues().await?;
            if dialogues.is_empty() {
                println!("No dialogues yet.");
                return Ok(());
            }
            println!("{:<20} {:>8}  LAST MESSAGE", "CHAT", "MESSAGES");
            for summary in &dialogues {
                println!("{}", summary_line(summary));
            }
        },
        DialogueAction::History { chat_id } => {
            let Some(dialogue) = store.find_dialogue(&ChatId::new(&chat_id)).await? else {
                println!("No dialogue for chat {chat_id}.");
                return Ok(());
            };
            for message in store.messages(&dialogue).await? {
                println!("{}", message_line(&message));
            }
        },
    }
    Ok(())
}

pub async fn handle_mode(action: ModeAction, pool: &SqlitePool) -> Result<()> {
    let store = SqliteChatModeStore::new(pool.clone());
    match action {
        ModeAction::Get { chat_id } => {
            let mode = store.get(&ChatId::new(&chat_id)).await?;
            println!("{chat_id}: {mode}");
        },
        ModeAction::Set { chat_id, mode } => {
            store.set(&ChatId::new(&chat_id), mode).await?;
            println!("{chat_id}: {mode}");
        },
    }
    Ok(())
}

fn summary_line(summary: &DialogueSummary) -> String {
    let last = summary
        .last_message_at
        .map_or_else(|| "-".to_string(), format_timestamp);
    format!(
        "{:<20} {:>8}  {last}",
        summary.dialogue.chat_id, summary.message_count
    )
}

fn message_line(message: &MessageRecord) -> String {
    format!("[{}] {}", format_timestamp(message.created_at), message.text)
}

fn format_timestamp(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}
