use anyhow::Context;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

/// "This message became that message on the other side of the relay". The
/// source is the message as its author wrote it, the mirror is the bot's copy.
/// Message ids are only unique within a chat, so each side carries its chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_chat_id: i64,
    pub source_message_id: i64,
    pub mirror_chat_id: i64,
    pub mirror_message_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

type LinkRow = (String, String, i64, i64, i64, i64, OffsetDateTime, OffsetDateTime);

impl TryFrom<LinkRow> for MessageLink {
    type Error = anyhow::Error;

    fn try_from(
        (id, owner_id, source_chat_id, source_message_id, mirror_chat_id, mirror_message_id, created_at, updated_at): LinkRow,
    ) -> anyhow::Result<Self> {
        Ok(MessageLink {
            id: Uuid::parse_str(&id).with_context(|| format!("corrupt link id {id}"))?,
            owner_id: Uuid::parse_str(&owner_id).with_context(|| format!("corrupt owner id {owner_id}"))?,
            source_chat_id,
            source_message_id,
            mirror_chat_id,
            mirror_message_id,
            created_at,
            updated_at,
        })
    }
}

/// Input row for [`MessageLedger::bulk_record`]. A missing mirror id falls
/// back to the configured default forward id.
#[derive(Debug, Clone, Copy)]
pub struct NewLink {
    pub owner_id: Uuid,
    pub source_chat_id: i64,
    pub source_message_id: i64,
    pub mirror_chat_id: i64,
    pub mirror_message_id: Option<i64>,
}

const COLUMNS: &str = "id,owner_id,source_chat_id,source_message_id,mirror_chat_id,mirror_message_id,created_at,updated_at";

#[derive(Clone, Copy)]
enum Side {
    Source,
    Mirror,
}

#[derive(Clone)]
pub struct MessageLedger {
    db_pool: SqlitePool,
    default_forward_id: i64,
}

impl MessageLedger {
    pub fn new(db_pool: SqlitePool, default_forward_id: i64) -> Self {
        Self { db_pool, default_forward_id }
    }

    pub async fn record(
        &self,
        owner_id: Uuid,
        source_chat_id: i64,
        source_message_id: i64,
        mirror_chat_id: i64,
        mirror_message_id: i64,
    ) -> anyhow::Result<MessageLink> {
        let now = OffsetDateTime::now_utc();
        let link = MessageLink {
            id: Uuid::now_v7(),
            owner_id,
            source_chat_id,
            source_message_id,
            mirror_chat_id,
            mirror_message_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(&format!("INSERT INTO messages ({COLUMNS}) VALUES (?,?,?,?,?,?,?,?)"))
            .bind(link.id.to_string())
            .bind(owner_id.to_string())
            .bind(source_chat_id)
            .bind(source_message_id)
            .bind(mirror_chat_id)
            .bind(mirror_message_id)
            .bind(now)
            .bind(now)
            .execute(&self.db_pool)
            .await
            .with_context(|| {
                format!("failed to record link for owner {owner_id}, message {source_message_id} in chat {source_chat_id}")
            })?;

        tracing::debug!(%owner_id, source_chat_id, source_message_id, mirror_chat_id, mirror_message_id, "link recorded");
        Ok(link)
    }

    /// Unordered batch insert: a failing row is logged and skipped, the rest
    /// are still written. Returns the rows that made it.
    pub async fn bulk_record(&self, links: &[NewLink]) -> Vec<MessageLink> {
        let mut recorded = Vec::with_capacity(links.len());
        for link in links {
            let mirror = link.mirror_message_id.unwrap_or(self.default_forward_id);
            let result = self
                .record(link.owner_id, link.source_chat_id, link.source_message_id, link.mirror_chat_id, mirror)
                .await;
            match result {
                Ok(link) => recorded.push(link),
                Err(err) => tracing::warn!(error = ?err, "skipping link in bulk insert"),
            }
        }
        recorded
    }

    /// Most recent link whose source is `source_message_id` in `chat_id`.
    pub async fn find_by_source(
        &self,
        owner_id: Uuid,
        chat_id: i64,
        source_message_id: i64,
    ) -> anyhow::Result<Option<MessageLink>> {
        self.find_latest(Side::Source, owner_id, chat_id, source_message_id)
            .await
            .with_context(|| {
                format!("failed to find link by source {source_message_id} in chat {chat_id} for owner {owner_id}")
            })
    }

    /// Most recent link whose mirror is `mirror_message_id` in `chat_id`.
    pub async fn find_by_mirror(
        &self,
        owner_id: Uuid,
        chat_id: i64,
        mirror_message_id: i64,
    ) -> anyhow::Result<Option<MessageLink>> {
        self.find_latest(Side::Mirror, owner_id, chat_id, mirror_message_id)
            .await
            .with_context(|| {
                format!("failed to find link by mirror {mirror_message_id} in chat {chat_id} for owner {owner_id}")
            })
    }

    pub async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<MessageLink>> {
        let row: Option<LinkRow> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM messages WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await
            .with_context(|| format!("failed to find link {id}"))?;
        row.map(MessageLink::try_from).transpose()
    }

    /// Newest first.
    pub async fn list_for(&self, owner_id: Uuid, limit: i64, skip: i64) -> anyhow::Result<Vec<MessageLink>> {
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM messages WHERE owner_id=? ORDER BY rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(owner_id.to_string())
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.db_pool)
        .await
        .with_context(|| format!("failed to list links for owner {owner_id}"))?;
        rows.into_iter().map(MessageLink::try_from).collect()
    }

    pub async fn count_for(&self, owner_id: Uuid) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE owner_id=?")
            .bind(owner_id.to_string())
            .fetch_one(&self.db_pool)
            .await
            .with_context(|| format!("failed to count links for owner {owner_id}"))?;
        Ok(count)
    }

    pub async fn delete_all_for(&self, owner_id: Uuid) -> anyhow::Result<u64> {
        let deleted = sqlx::query("DELETE FROM messages WHERE owner_id=?")
            .bind(owner_id.to_string())
            .execute(&self.db_pool)
            .await
            .with_context(|| format!("failed to delete links for owner {owner_id}"))?
            .rows_affected();

        tracing::info!(%owner_id, deleted, "links deleted");
        Ok(deleted)
    }

    async fn find_latest(
        &self,
        side: Side,
        owner_id: Uuid,
        chat_id: i64,
        message_id: i64,
    ) -> anyhow::Result<Option<MessageLink>> {
        let filter = match side {
            Side::Source => "source_chat_id=? AND source_message_id=?",
            Side::Mirror => "mirror_chat_id=? AND mirror_message_id=?",
        };
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM messages WHERE owner_id=? AND {filter} ORDER BY rowid DESC LIMIT 1"
        ))
        .bind(owner_id.to_string())
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(&self.db_pool)
        .await?;
        row.map(MessageLink::try_from).transpose()
    }
}
