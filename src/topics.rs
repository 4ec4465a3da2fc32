use std::sync::Arc;

use anyhow::Context;

use crate::telegram::{TelegramApi, User};

/// Longest topic name the Bot API accepts.
pub const MAX_TOPIC_NAME: usize = 128;

/// "First Last", or just "First" when there is no last name.
pub fn display_name(user: Option<&User>) -> String {
    let Some(user) = user else {
        return String::new();
    };
    match user.last_name.as_deref().map(str::trim) {
        Some(last) if !last.is_empty() => format!("{} {}", user.first_name.trim(), last).trim().to_owned(),
        _ => user.first_name.trim().to_owned(),
    }
}

pub(crate) fn topic_name(display_name: &str, chat_id: i64) -> String {
    let name = display_name.trim();
    if name.is_empty() {
        return chat_id.to_string();
    }
    name.chars().take(MAX_TOPIC_NAME).collect()
}

#[derive(Clone)]
pub struct TopicProvisioner {
    api: Arc<dyn TelegramApi>,
}

impl TopicProvisioner {
    pub fn new(api: Arc<dyn TelegramApi>) -> Self {
        Self { api }
    }

    /// Opens a topic in the staff group for `chat_id` and returns its thread id.
    pub async fn create_topic(&self, staff_chat: i64, display_name: &str, chat_id: i64) -> anyhow::Result<i64> {
        let name = topic_name(display_name, chat_id);
        let topic = self
            .api
            .create_forum_topic(staff_chat, &name)
            .await
            .with_context(|| format!("failed to create topic for chat {chat_id}"))?;

        tracing::info!(chat_id, thread_id = topic.message_thread_id, name = %topic.name, "topic created");
        Ok(topic.message_thread_id)
    }
}
