mod api;
mod types;

pub use api::{HttpTelegramApi, Target, TelegramApi};
pub use types::{BotIdentity, Chat, ChatKind, ForumTopic, Message, MessageId, Update, User, WebhookInfo};
