use std::sync::Arc;

use axum::{
    Json, Router, body::Bytes, debug_handler, extract::State, http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::Serialize;

use crate::{AppResult, AppState, relay::RelayEngine, telegram::{TelegramApi, Update, WebhookInfo}};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone, Default)]
pub struct WebhookSecret(pub Option<Arc<str>>);

impl WebhookSecret {
    fn accepts(&self, headers: &HeaderMap) -> bool {
        match &self.0 {
            Some(expected) => headers
                .get(SECRET_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|provided| provided == &**expected),
            None => true,
        }
    }
}

pub fn router(webhook_path: &str) -> Router<AppState> {
    Router::new()
        .route(webhook_path, post(telegram_webhook))
        .route("/selfWebhook", get(self_webhook))
        .route("/webhookInfo", get(webhook_info))
}

/// Always acknowledges, so the platform never retries an update that failed
/// to relay.
#[debug_handler(state = AppState)]
pub(crate) async fn telegram_webhook(
    State(engine): State<RelayEngine>,
    State(secret): State<WebhookSecret>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !secret.accepts(&headers) {
        tracing::warn!("webhook call with a bad secret token");
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            tracing::warn!(error = %err, "unreadable update");
            return StatusCode::OK;
        }
    };

    // the relay runs on its own task so a dropped connection can't cancel it
    // between the copy and the ledger write
    let task = tokio::spawn(async move { engine.handle(&update).await });
    if let Err(err) = task.await {
        tracing::error!(error = %err, "relay task aborted");
    }

    StatusCode::OK
}

#[derive(Serialize)]
pub(crate) struct SelfWebhookResponse {
    message: &'static str,
}

#[debug_handler]
pub(crate) async fn self_webhook() -> Json<SelfWebhookResponse> {
    tracing::debug!("self webhook test endpoint called");
    Json(SelfWebhookResponse { message: "hello world" })
}

#[debug_handler(state = AppState)]
pub(crate) async fn webhook_info(
    State(api): State<Arc<dyn TelegramApi>>,
) -> AppResult<Json<WebhookInfo>> {
    Ok(Json(api.get_webhook_info().await?))
}
