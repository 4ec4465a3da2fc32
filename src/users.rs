use anyhow::Context;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Uuid,
    pub chat_id: i64,
    pub thread_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

type UserRow = (String, i64, i64, OffsetDateTime, OffsetDateTime);

impl TryFrom<UserRow> for UserIdentity {
    type Error = anyhow::Error;

    fn try_from((id, chat_id, thread_id, created_at, updated_at): UserRow) -> anyhow::Result<Self> {
        Ok(UserIdentity {
            id: Uuid::parse_str(&id).with_context(|| format!("corrupt user id {id}"))?,
            chat_id,
            thread_id,
            created_at,
            updated_at,
        })
    }
}

const COLUMNS: &str = "id,chat_id,thread_id,created_at,updated_at";

#[derive(Clone)]
pub struct UserStore {
    db_pool: SqlitePool,
}

impl UserStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn exists(&self, chat_id: i64) -> anyhow::Result<bool> {
        let found = sqlx::query("SELECT 1 FROM users WHERE chat_id=? LIMIT 1")
            .bind(chat_id)
            .fetch_optional(&self.db_pool)
            .await
            .with_context(|| format!("failed to check user existence for chat {chat_id}"))?;
        Ok(found.is_some())
    }

    pub async fn find_by_chat(&self, chat_id: i64) -> anyhow::Result<Option<UserIdentity>> {
        self.find_one("chat_id", chat_id)
            .await
            .with_context(|| format!("failed to find user by chat {chat_id}"))
    }

    pub async fn find_by_thread(&self, thread_id: i64) -> anyhow::Result<Option<UserIdentity>> {
        self.find_one("thread_id", thread_id)
            .await
            .with_context(|| format!("failed to find user by thread {thread_id}"))
    }

    pub async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserIdentity>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await
            .with_context(|| format!("failed to find user {id}"))?;
        row.map(UserIdentity::try_from).transpose()
    }

    /// Atomic upsert on `chat_id`. An existing identity is returned untouched
    /// and the flag reports whether this call inserted the row.
    pub async fn find_or_create(&self, chat_id: i64, thread_id: i64) -> anyhow::Result<(UserIdentity, bool)> {
        let now = OffsetDateTime::now_utc();
        let inserted = sqlx::query(
            "INSERT INTO users (id,chat_id,thread_id,created_at,updated_at) VALUES (?,?,?,?,?)
             ON CONFLICT(chat_id) DO NOTHING",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(chat_id)
        .bind(thread_id)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await
        .with_context(|| format!("failed to find or create user for chat {chat_id}"))?
        .rows_affected() == 1;

        let user = self
            .find_by_chat(chat_id)
            .await?
            .with_context(|| format!("user for chat {chat_id} missing right after upsert"))?;

        Ok((user, inserted))
    }

    pub async fn update_thread(&self, chat_id: i64, thread_id: i64) -> anyhow::Result<Option<UserIdentity>> {
        let updated = sqlx::query("UPDATE users SET thread_id=?, updated_at=? WHERE chat_id=?")
            .bind(thread_id)
            .bind(OffsetDateTime::now_utc())
            .bind(chat_id)
            .execute(&self.db_pool)
            .await
            .with_context(|| format!("failed to update thread for chat {chat_id}"))?
            .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        tracing::info!(chat_id, thread_id, "thread reassigned");
        self.find_by_chat(chat_id).await
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM users WHERE id=?")
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await
            .with_context(|| format!("failed to delete user {id}"))?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn find_one(&self, column: &str, value: i64) -> anyhow::Result<Option<UserIdentity>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE {column}=? ORDER BY rowid LIMIT 1"))
                .bind(value)
                .fetch_optional(&self.db_pool)
                .await?;
        row.map(UserIdentity::try_from).transpose()
    }
}
