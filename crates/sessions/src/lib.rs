//! Durable per-chat state: the chat mode and the dialogue history.
//!
//! Both live in one SQLite database. `dialogues` holds one row per chat
//! identifier (unique); `messages` is an append-only log keyed by dialogue.
//! `chat_modes` maps chat identifier to `bot` / `operator`.

pub mod dialogue;
pub mod mode;
pub mod pool;

pub use {
    dialogue::{Dialogue, DialogueStore, DialogueSummary, MessageRecord, SqliteDialogueStore},
    mode::{ChatModeStore, SqliteChatModeStore},
    pool::{init_schema, open_memory_pool, open_pool},
};

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
