#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use topic_relay::{
    db,
    messages::MessageLedger,
    relay::RelayEngine,
    telegram::{BotIdentity, ForumTopic, Target, TelegramApi, Update, WebhookInfo},
    users::UserStore,
};

pub const STAFF: i64 = -100500;
pub const BOT_ID: i64 = 8;
pub const STAFF_MEMBER: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateTopic { chat_id: i64, name: String },
    Copy { from_chat_id: i64, message_id: i64, target: Target },
    Forward { from_chat_id: i64, message_id: i64, target: Target },
    Send { chat_id: i64, text: String },
}

pub struct MockApi {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI64,
    next_thread_id: AtomicI64,
    pub fail_relay: AtomicBool,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
            next_thread_id: AtomicI64::new(10),
            fail_relay: AtomicBool::new(false),
        }
    }
}

impl MockApi {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn topics_created(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CreateTopic { .. }))
            .count()
    }

    /// The id the next copy or forward will get.
    pub fn set_next_message_id(&self, id: i64) {
        self.next_message_id.store(id, Ordering::SeqCst);
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn relayed_id(&self) -> anyhow::Result<i64> {
        if self.fail_relay.load(Ordering::SeqCst) {
            return Err(anyhow!("Forbidden: bot was blocked by the user"));
        }
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl TelegramApi for MockApi {
    async fn get_me(&self) -> anyhow::Result<BotIdentity> {
        Ok(bot())
    }

    async fn create_forum_topic(&self, chat_id: i64, name: &str) -> anyhow::Result<ForumTopic> {
        self.push(Call::CreateTopic { chat_id, name: name.to_owned() });
        Ok(ForumTopic {
            message_thread_id: self.next_thread_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_owned(),
        })
    }

    async fn copy_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64> {
        self.push(Call::Copy { from_chat_id, message_id, target });
        self.relayed_id()
    }

    async fn forward_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64> {
        self.push(Call::Forward { from_chat_id, message_id, target });
        self.relayed_id()
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<i64> {
        self.push(Call::Send { chat_id, text: text.to_owned() });
        self.relayed_id()
    }

    async fn set_webhook(&self, _url: &str, _secret: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_webhook_info(&self) -> anyhow::Result<WebhookInfo> {
        Ok(WebhookInfo {
            url: "https://relay.example/telegramWebhook".to_owned(),
            ..Default::default()
        })
    }
}

pub fn bot() -> BotIdentity {
    serde_json::from_value(json!({ "id": BOT_ID, "is_bot": true, "first_name": "relay" })).unwrap()
}

pub async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&db_pool, 2, 2).await.unwrap();
    db_pool
}

pub fn engine(db_pool: SqlitePool, api: Arc<MockApi>) -> RelayEngine {
    RelayEngine::new(
        UserStore::new(db_pool.clone()),
        MessageLedger::new(db_pool, 2),
        api,
        Arc::new(bot()),
        STAFF,
    )
}

pub fn update(message: Value) -> Update {
    serde_json::from_value(json!({ "update_id": 1, "message": message })).unwrap()
}

pub fn user_message(chat_id: i64, message_id: i64, first: &str, last: Option<&str>) -> Value {
    json!({
        "message_id": message_id,
        "date": 0,
        "from": { "id": chat_id, "is_bot": false, "first_name": first, "last_name": last },
        "chat": { "id": chat_id, "type": "private" },
        "text": "hello"
    })
}

pub fn staff_message(thread_id: i64, message_id: i64) -> Value {
    json!({
        "message_id": message_id,
        "message_thread_id": thread_id,
        "is_topic_message": true,
        "date": 0,
        "from": { "id": STAFF_MEMBER, "is_bot": false, "first_name": "Grace" },
        "chat": { "id": STAFF, "type": "supergroup" },
        "reply_to_message": {
            "message_id": thread_id,
            "date": 0,
            "from": { "id": BOT_ID, "is_bot": true, "first_name": "relay" },
            "chat": { "id": STAFF, "type": "supergroup" },
            "forum_topic_created": { "name": "topic", "icon_color": 0 }
        },
        "text": "hi there"
    })
}

/// Makes `message` a reply to `target_id` written by `author_id`.
pub fn replying_to(mut message: Value, target_id: i64, author_id: i64) -> Value {
    let chat = message["chat"].clone();
    message["reply_to_message"] = json!({
        "message_id": target_id,
        "date": 0,
        "from": { "id": author_id, "is_bot": author_id == BOT_ID, "first_name": "someone" },
        "chat": chat
    });
    message
}
