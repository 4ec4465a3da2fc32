pub mod appresult;
pub mod config;
pub mod db;
pub mod messages;
pub mod relay;
pub mod telegram;
pub mod topics;
pub mod users;
pub mod webhook;

use std::sync::Arc;

use axum::extract::FromRef;

pub use appresult::{AppError, AppResult};

use crate::{relay::RelayEngine, telegram::TelegramApi, webhook::WebhookSecret};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub engine: RelayEngine,
    pub api: Arc<dyn TelegramApi>,
    pub secret: WebhookSecret,
}
