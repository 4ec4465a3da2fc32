use std::str::FromStr;

use anyhow::Context;
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqlitePoolOptions}};

use crate::config::Config;

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("invalid DATABASE_URL {}", config.database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(options)
        .await
        .context("failed to connect to database")?;

    migrate(&db_pool, config.default_thread_id, config.default_forward_id).await?;
    Ok(db_pool)
}

/// Creates the tables and indexes if they are missing.
///
/// users:    unique chat_id, indexed thread_id
/// messages: indexed (owner_id, source_chat_id, source_message_id),
///           (owner_id, mirror_chat_id, mirror_message_id)
pub async fn migrate(db_pool: &SqlitePool, default_thread_id: i64, default_forward_id: i64) -> anyhow::Result<()> {
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY NOT NULL,
                chat_id INTEGER NOT NULL UNIQUE,
                thread_id INTEGER NOT NULL DEFAULT {default_thread_id},
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
        ),
        "CREATE INDEX IF NOT EXISTS users_thread_id ON users (thread_id)".to_owned(),
        format!(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY NOT NULL,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                source_chat_id INTEGER NOT NULL,
                source_message_id INTEGER NOT NULL,
                mirror_chat_id INTEGER NOT NULL,
                mirror_message_id INTEGER NOT NULL DEFAULT {default_forward_id},
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
        ),
        "CREATE INDEX IF NOT EXISTS messages_owner_source ON messages (owner_id, source_chat_id, source_message_id)"
            .to_owned(),
        "CREATE INDEX IF NOT EXISTS messages_owner_mirror ON messages (owner_id, mirror_chat_id, mirror_message_id)"
            .to_owned(),
        "CREATE INDEX IF NOT EXISTS messages_owner_created ON messages (owner_id, created_at)".to_owned(),
    ];

    for statement in statements {
        sqlx::query(&statement)
            .execute(db_pool)
            .await
            .context("failed to create schema")?;
    }

    Ok(())
}

/// Single-connection in-memory pool with the schema applied.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&db_pool, 2, 2).await.unwrap();
    db_pool
}
