use {
    async_trait::async_trait,
    relaydesk_common::{ChatId, PersistenceError},
    serde::Serialize,
    sqlx::SqlitePool,
};

use crate::now_ms;

/// The persistent conversation record for one chat identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dialogue {
    pub id: i64,
    pub chat_id: ChatId,
    pub created_at: i64,
}

/// One immutable entry in a dialogue's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: i64,
    pub dialogue_id: i64,
    pub text: String,
    pub created_at: i64,
}

/// A dialogue with its message count, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueSummary {
    pub dialogue: Dialogue,
    pub message_count: i64,
    pub last_message_at: Option<i64>,
}

/// Durable dialogue history.
#[async_trait]
pub trait DialogueStore: Send + Sync {
    /// Return the chat's dialogue, creating it if absent. At most one
    /// dialogue is ever created per chat identifier.
    async fn ensure_dialogue(&self, chat_id: &ChatId) -> Result<Dialogue, PersistenceError>;

    /// Append `text` to the dialogue's ordered log.
    ///
    /// With an `event_id` the append happens once per event: a redelivered
    /// event returns the record stored the first time.
    async fn append_message(
        &self,
        dialogue: &Dialogue,
        text: &str,
        event_id: Option<&str>,
    ) -> Result<MessageRecord, PersistenceError>;

    async fn find_dialogue(&self, chat_id: &ChatId) -> Result<Option<Dialogue>, PersistenceError>;

    /// Messages in insertion order.
    async fn messages(&self, dialogue: &Dialogue) -> Result<Vec<MessageRecord>, PersistenceError>;

    /// All dialogues, oldest first.
    async fn list_dialogues(&self) -> Result<Vec<DialogueSummary>, PersistenceError>;
}

// ── SQLite-backed dialogue store ────────────────────────────────────

#[derive(Clone)]
pub struct SqliteDialogueStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DialogueRow {
    id: i64,
    chat_id: String,
    created_at: i64,
}

impl From<DialogueRow> for Dialogue {
    fn from(r: DialogueRow) -> Self {
        Self {
            id: r.id,
            chat_id: ChatId::new(r.chat_id),
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    dialogue_id: i64,
    text: String,
    created_at: i64,
}

impl From<MessageRow> for MessageRecord {
    fn from(r: MessageRow) -> Self {
        Self {
            id: r.id,
            dialogue_id: r.dialogue_id,
            text: r.text,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    chat_id: String,
    created_at: i64,
    message_count: i64,
    last_message_at: Option<i64>,
}

impl SqliteDialogueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `dialogues` and `messages` tables if they don't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS dialogues (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id    TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::new("dialogues.init", e))?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                dialogue_id INTEGER NOT NULL REFERENCES dialogues(id),
                event_id    TEXT,
                text        TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                UNIQUE (dialogue_id, event_id)
            )"#,
        )
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::new("messages.init", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_dialogue ON messages(dialogue_id, id)",
        )
        .execute(pool)
        .await
        .map_err(|e| PersistenceError::new("messages.init", e))?;

        Ok(())
    }
}

#[async_trait]
impl DialogueStore for SqliteDialogueStore {
    async fn ensure_dialogue(&self, chat_id: &ChatId) -> Result<Dialogue, PersistenceError> {
        // The UNIQUE constraint makes concurrent first contacts collapse into one row.
        sqlx::query(
            r#"INSERT INTO dialogues (chat_id, created_at) VALUES (?, ?)
               ON CONFLICT(chat_id) DO NOTHING"#,
        )
        .bind(chat_id.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::new("dialogues.ensure", e))?;

        sqlx::query_as::<_, DialogueRow>(
            "SELECT id, chat_id, created_at FROM dialogues WHERE chat_id = ?",
        )
        .bind(chat_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| PersistenceError::new("dialogues.ensure", e))
    }

    async fn append_message(
        &self,
        dialogue: &Dialogue,
        text: &str,
        event_id: Option<&str>,
    ) -> Result<MessageRecord, PersistenceError> {
        let created_at = now_ms();
        // NULL event ids never conflict, so events without one always append.
        let result = sqlx::query(
            r#"INSERT INTO messages (dialogue_id, event_id, text, created_at) VALUES (?, ?, ?, ?)
               ON CONFLICT(dialogue_id, event_id) DO NOTHING"#,
        )
        .bind(dialogue.id)
        .bind(event_id)
        .bind(text)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::new("messages.append", e))?;

        if result.rows_affected() == 0 {
            return sqlx::query_as::<_, MessageRow>(
                r#"SELECT id, dialogue_id, text, created_at FROM messages
                   WHERE dialogue_id = ? AND event_id = ?"#,
            )
            .bind(dialogue.id)
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| PersistenceError::new("messages.append", e));
        }

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            dialogue_id: dialogue.id,
            text: text.to_string(),
            created_at,
        })
    }

    async fn find_dialogue(&self, chat_id: &ChatId) -> Result<Option<Dialogue>, PersistenceError> {
        sqlx::query_as::<_, DialogueRow>(
            "SELECT id, chat_id, created_at FROM dialogues WHERE chat_id = ?",
        )
        .bind(chat_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Into::into))
        .map_err(|e| PersistenceError::new("dialogues.find", e))
    }

    async fn messages(&self, dialogue: &Dialogue) -> Result<Vec<MessageRecord>, PersistenceError> {
        sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, dialogue_id, text, created_at FROM messages
               WHERE dialogue_id = ? ORDER BY id ASC"#,
        )
        .bind(dialogue.id)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
        .map_err(|e| PersistenceError::new("messages.list", e))
    }

    async fn list_dialogues(&self) -> Result<Vec<DialogueSummary>, PersistenceError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"SELECT d.id, d.chat_id, d.created_at,
                      COUNT(m.id) AS message_count,
                      MAX(m.created_at) AS last_message_at
               FROM dialogues d
               LEFT JOIN messages m ON m.dialogue_id = d.id
               GROUP BY d.id
               ORDER BY d.id ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::new("dialogues.list", e))?;

        Ok(rows
            .into_iter()
            .map(|r| DialogueSummary {
                dialogue: Dialogue {
                    id: r.id,
                    chat_id: ChatId::new(r.chat_id),
                    created_at: r.created_at,
                },
                message_count: r.message_count,
                last_message_at: r.last_message_at,
            })
            .collect())
    }
}
