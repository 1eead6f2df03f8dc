use std::str::FromStr;

use {
    relaydesk_common::PersistenceError,
    sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    tracing::debug,
};

use crate::{dialogue::SqliteDialogueStore, mode::SqliteChatModeStore};

/// Open (creating if missing) the SQLite database at `url` and create the
/// tables this crate owns.
pub async fn open_pool(url: &str) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| PersistenceError::new("database.open", e))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    if let Some(parent) = options.get_filename().parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::new("database.open", e))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .map_err(|e| PersistenceError::new("database.open", e))?;

    init_schema(&pool).await?;
    debug!(url, "database ready");
    Ok(pool)
}

/// Create every table used by the stores. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), PersistenceError> {
    SqliteDialogueStore::init(pool).await?;
    SqliteChatModeStore::init(pool).await?;
    Ok(())
}

/// Open a private in-memory database with the schema applied.
///
/// Limited to one connection that is never recycled: every connection to
/// `sqlite::memory:` is its own database.
pub async fn open_memory_pool() -> Result<SqlitePool, PersistenceError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| PersistenceError::new("database.open", e))?;
    init_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    open_memory_pool().await.unwrap()
}
