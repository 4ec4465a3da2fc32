mod reply;
mod route;

use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use crate::{
    messages::MessageLedger,
    telegram::{BotIdentity, Message, Target, TelegramApi, Update},
    topics::{self, TopicProvisioner},
    users::{UserIdentity, UserStore},
};

pub use reply::{ReplyRef, reply_ref, resolve};
pub use route::{Route, classify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Relayed(Relayed),
    Discarded(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub owner_id: Uuid,
    pub source_message_id: i64,
    pub mirror_message_id: i64,
    pub reply_to: Option<i64>,
    pub forwarded: bool,
    pub is_new_user: bool,
}

#[derive(Clone)]
pub struct RelayEngine {
    users: UserStore,
    ledger: MessageLedger,
    topics: TopicProvisioner,
    api: Arc<dyn TelegramApi>,
    bot: Arc<BotIdentity>,
    staff_chat: i64,
}

impl RelayEngine {
    pub fn new(
        users: UserStore,
        ledger: MessageLedger,
        api: Arc<dyn TelegramApi>,
        bot: Arc<BotIdentity>,
        staff_chat: i64,
    ) -> Self {
        Self {
            users,
            ledger,
            topics: TopicProvisioner::new(api.clone()),
            api,
            bot,
            staff_chat,
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }

    #[tracing::instrument(skip_all, fields(update_id = update.update_id))]
    pub async fn handle(&self, update: &Update) -> anyhow::Result<Outcome> {
        let Some(message) = update.message.as_ref() else {
            tracing::debug!("update carries no message");
            return Ok(Outcome::Discarded("no message"));
        };

        let outcome = match classify(message, self.staff_chat, self.bot.id) {
            Route::Private { chat_id } => self.from_user(message, chat_id).await,
            Route::Topic { thread_id } => self.from_staff(message, thread_id).await,
            Route::Unroutable(reason) => Ok(Outcome::Discarded(reason)),
        };

        match &outcome {
            Ok(Outcome::Relayed(relayed)) => tracing::info!(
                chat_id = message.chat.id,
                message_id = message.message_id,
                mirror_message_id = relayed.mirror_message_id,
                new_user = relayed.is_new_user,
                "message relayed"
            ),
            Ok(Outcome::Discarded(reason)) => tracing::debug!(
                chat_id = message.chat.id,
                message_id = message.message_id,
                reason,
                "message discarded"
            ),
            Err(err) => tracing::error!(
                chat_id = message.chat.id,
                message_id = message.message_id,
                error = ?err,
                "relay failed"
            ),
        }
        outcome
    }

    async fn from_user(&self, message: &Message, chat_id: i64) -> anyhow::Result<Outcome> {
        let registered = self.users.exists(chat_id).await?;
        let (user, is_new_user) = self.user_for(message, chat_id, registered).await?;

        let target = Target {
            chat_id: self.staff_chat,
            thread_id: Some(user.thread_id),
            reply_to: None,
        };
        self.relay(message, &user, target, is_new_user).await
    }

    async fn from_staff(&self, message: &Message, thread_id: i64) -> anyhow::Result<Outcome> {
        let Some(user) = self.users.find_by_thread(thread_id).await? else {
            return Ok(Outcome::Discarded("thread has no owner"));
        };

        let target = Target {
            chat_id: user.chat_id,
            thread_id: None,
            reply_to: None,
        };
        self.relay(message, &user, target, false).await
    }

    async fn user_for(
        &self,
        message: &Message,
        chat_id: i64,
        registered: bool,
    ) -> anyhow::Result<(UserIdentity, bool)> {
        if !registered {
            return self.first_contact(message, chat_id).await;
        }
        match self.users.find_by_chat(chat_id).await? {
            Some(user) => {
                tracing::debug!(chat_id, owner_id = %user.id, "existing user found");
                Ok((user, false))
            }
            None => {
                tracing::warn!(chat_id, "user disappeared between registration check and retrieval");
                self.first_contact(message, chat_id).await
            }
        }
    }

    // no lock: concurrent first messages may each open a topic, the upsert
    // keeps one identity and the other topic stays unused
    async fn first_contact(&self, message: &Message, chat_id: i64) -> anyhow::Result<(UserIdentity, bool)> {
        let name = topics::display_name(message.from.as_ref());
        let thread_id = self.topics.create_topic(self.staff_chat, &name, chat_id).await?;
        let (user, created) = self.users.find_or_create(chat_id, thread_id).await?;

        if created {
            tracing::info!(chat_id, owner_id = %user.id, thread_id, "new user registered");
        } else {
            tracing::warn!(
                chat_id,
                owner_id = %user.id,
                kept_thread_id = user.thread_id,
                orphaned_thread_id = thread_id,
                "lost first-contact race, topic left unused"
            );
        }
        Ok((user, created))
    }

    /// Copies or forwards `message` to `target` and records the link. The link
    /// is written as soon as the platform accepts the message, and a failed
    /// write does not undo the relay.
    async fn relay(&self, message: &Message, user: &UserIdentity, mut target: Target, is_new_user: bool) -> anyhow::Result<Outcome> {
        let forwarded = message.is_forwarded();
        let from_chat_id = message.chat.id;
        if let Some(reply) = reply_ref(message) {
            target.reply_to = resolve(&self.ledger, user.id, from_chat_id, reply).await?;
            if target.reply_to.is_none() {
                tracing::debug!(reply_to = reply.message_id(), "reply target has no counterpart");
            }
        }

        let sent = if forwarded {
            self.api.forward_message(from_chat_id, message.message_id, target).await
        } else {
            self.api.copy_message(from_chat_id, message.message_id, target).await
        };
        let mirror_message_id = sent.with_context(|| {
            format!("failed to relay message {} from chat {from_chat_id} to chat {}", message.message_id, target.chat_id)
        })?;

        let link = self
            .ledger
            .record(user.id, from_chat_id, message.message_id, target.chat_id, mirror_message_id)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    owner_id = %user.id,
                    error = ?err,
                    message_id = message.message_id,
                    mirror_message_id,
                    "message relayed but link not recorded"
                )
            })?;

        Ok(Outcome::Relayed(Relayed {
            owner_id: user.id,
            source_message_id: link.source_message_id,
            mirror_message_id: link.mirror_message_id,
            reply_to: target.reply_to,
            forwarded,
            is_new_user,
        }))
    }

    /// Administrative removal of a user and every link they own. Returns the
    /// number of links removed, or `None` if the chat is unknown.
    pub async fn purge_user(&self, chat_id: i64) -> anyhow::Result<Option<u64>> {
        let Some(user) = self.users.find_by_chat(chat_id).await? else {
            return Ok(None);
        };
        let links = self.ledger.delete_all_for(user.id).await?;
        self.users.delete(user.id).await?;

        tracing::info!(chat_id, owner_id = %user.id, links, "user purged");
        Ok(Some(links))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        db,
        telegram::{ForumTopic, WebhookInfo},
    };

    const STAFF: i64 = -100;

    /// Opens topics, refuses everything else.
    struct TopicsOnly;

    #[async_trait]
    impl TelegramApi for TopicsOnly {
        async fn get_me(&self) -> anyhow::Result<BotIdentity> {
            Err(anyhow!("unused"))
        }

        async fn create_forum_topic(&self, _chat_id: i64, name: &str) -> anyhow::Result<ForumTopic> {
            Ok(ForumTopic { message_thread_id: 33, name: name.to_owned() })
        }

        async fn copy_message(&self, _from_chat_id: i64, _message_id: i64, _target: Target) -> anyhow::Result<i64> {
            Err(anyhow!("unused"))
        }

        async fn forward_message(&self, _from_chat_id: i64, _message_id: i64, _target: Target) -> anyhow::Result<i64> {
            Err(anyhow!("unused"))
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> anyhow::Result<i64> {
            Err(anyhow!("unused"))
        }

        async fn set_webhook(&self, _url: &str, _secret: Option<&str>) -> anyhow::Result<()> {
            Err(anyhow!("unused"))
        }

        async fn get_webhook_info(&self) -> anyhow::Result<WebhookInfo> {
            Err(anyhow!("unused"))
        }
    }

    async fn engine() -> RelayEngine {
        let db_pool = db::memory_pool().await;
        let bot: BotIdentity = serde_json::from_value(json!({ "id": 8, "is_bot": true, "first_name": "relay" })).unwrap();
        RelayEngine::new(
            UserStore::new(db_pool.clone()),
            MessageLedger::new(db_pool, 2),
            Arc::new(TopicsOnly),
            Arc::new(bot),
            STAFF,
        )
    }

    fn private_message() -> Message {
        serde_json::from_value(json!({
            "message_id": 1,
            "from": { "id": 555, "first_name": "Ada", "last_name": "Lovelace" },
            "chat": { "id": 555, "type": "private" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn vanished_identity_falls_back_to_first_contact() {
        let engine = engine().await;

        // registered when checked, gone by the time it is read
        let (user, is_new_user) = engine.user_for(&private_message(), 555, true).await.unwrap();

        assert!(is_new_user);
        assert_eq!((user.chat_id, user.thread_id), (555, 33));
        assert_eq!(engine.users().find_by_chat(555).await.unwrap().map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn registered_identity_is_reused() {
        let engine = engine().await;
        let (existing, _) = engine.users().find_or_create(555, 12).await.unwrap();

        let (user, is_new_user) = engine.user_for(&private_message(), 555, true).await.unwrap();

        assert!(!is_new_user);
        assert_eq!((user.id, user.thread_id), (existing.id, 12));
    }
}
