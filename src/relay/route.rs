use crate::telegram::{ChatKind, Message};

/// Which way an inbound message travels, decided once per update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A user wrote to the bot in private.
    Private { chat_id: i64 },
    /// Staff wrote inside a user's topic.
    Topic { thread_id: i64 },
    Unroutable(&'static str),
}

pub fn classify(message: &Message, staff_chat: i64, bot_id: i64) -> Route {
    if message.author_id() == Some(bot_id) {
        return Route::Unroutable("authored by the bot");
    }
    if message.is_forum_service() {
        return Route::Unroutable("forum service message");
    }

    if message.chat.kind == ChatKind::Private {
        return Route::Private { chat_id: message.chat.id };
    }

    if message.chat.id == staff_chat {
        return match (message.is_topic_message, message.message_thread_id) {
            (true, Some(thread_id)) => Route::Topic { thread_id },
            _ => Route::Unroutable("staff message outside a topic"),
        };
    }

    Route::Unroutable("unknown chat")
}
