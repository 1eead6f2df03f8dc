use {
    async_trait::async_trait,
    relaydesk_common::{ChatId, ChatMode, PersistenceError},
    sqlx::SqlitePool,
    tracing::debug,
};

use crate::now_ms;

/// Durable chat identifier → mode mapping.
#[async_trait]
pub trait ChatModeStore: Send + Sync {
    /// Current mode. A chat that was never set is in [`ChatMode::Bot`].
    async fn get(&self, chat_id: &ChatId) -> Result<ChatMode, PersistenceError>;

    /// Last write wins.
    async fn set(&self, chat_id: &ChatId, mode: ChatMode) -> Result<(), PersistenceError>;
}

/// SQLite-backed mode store.
#[derive(Clone)]
pub struct SqliteChatModeStore {
    pool: SqlitePool,
}

impl SqliteChatModeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `chat_modes` table if it doesn't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_modes (
                chat_id    TEXT PRIMARY KEY,
                mode       TEXT NOT NULL CHECK (mode IN ('bot', 'operator')),
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::new("chat_modes.init", e))?;
        Ok(())
    }
}

#[async_trait]
impl ChatModeStore for SqliteChatModeStore {
    async fn get(&self, chat_id: &ChatId) -> Result<ChatMode, PersistenceError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT mode FROM chat_modes WHERE chat_id = ?")
                .bind(chat_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PersistenceError::new("chat_modes.get", e))?;

        match stored {
            None => Ok(ChatMode::default()),
            Some(raw) => raw
                .parse::<ChatMode>()
                .map_err(|e| PersistenceError::new("chat_modes.get", e)),
        }
    }

    async fn set(&self, chat_id: &ChatId, mode: ChatMode) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"INSERT INTO chat_modes (chat_id, mode, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(chat_id) DO UPDATE SET
                 mode = excluded.mode,
                 updated_at = excluded.updated_at"#,
        )
        .bind(chat_id.as_str())
        .bind(mode.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::new("chat_modes.set", e))?;
        debug!(chat_id = %chat_id, mode = %mode, "chat mode stored");
        Ok(())
    }
}
