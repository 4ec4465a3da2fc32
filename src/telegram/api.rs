use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

use super::types::{BotIdentity, ForumTopic, MessageId, WebhookInfo};

/// Where a relayed message lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub reply_to: Option<i64>,
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_me(&self) -> anyhow::Result<BotIdentity>;
    async fn create_forum_topic(&self, chat_id: i64, name: &str) -> anyhow::Result<ForumTopic>;
    /// Returns the id of the copy.
    async fn copy_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64>;
    /// Returns the id of the forwarded message. `target.reply_to` is ignored.
    async fn forward_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64>;
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<i64>;
    async fn set_webhook(&self, url: &str, secret: Option<&str>) -> anyhow::Result<()>;
    async fn get_webhook_info(&self) -> anyhow::Result<WebhookInfo>;
}

#[derive(Debug, Clone, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Clone)]
pub struct HttpTelegramApi {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl HttpTelegramApi {
    pub fn new(client: Client, api_base: &str, bot_token: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            bot_token: bot_token.to_owned(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: Value) -> anyhow::Result<T> {
        let res = self
            .client
            .post(self.url(method))
            .timeout(Duration::from_secs(10))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("telegram {method} request"))?;

        let status = res.status();
        let body: TelegramResponse<T> = match res.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(anyhow!("telegram {method} {status}")),
            Err(err) => return Err(err).with_context(|| format!("decode telegram {method} response")),
        };

        match (body.ok, body.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(anyhow!("telegram {method} returned no result")),
            (false, _) => Err(anyhow!(
                "telegram {method} failed ({status}): {}",
                body.description.unwrap_or("unknown error".to_owned())
            )),
        }
    }
}

fn relay_payload(from_chat_id: i64, message_id: i64, target: Target, with_reply: bool) -> Value {
    let mut payload = json!({
        "chat_id": target.chat_id,
        "from_chat_id": from_chat_id,
        "message_id": message_id,
    });
    if let Some(thread_id) = target.thread_id {
        payload["message_thread_id"] = json!(thread_id);
    }
    if let (true, Some(reply_to)) = (with_reply, target.reply_to) {
        payload["reply_parameters"] = json!({
            "message_id": reply_to,
            "allow_sending_without_reply": true,
        });
    }
    payload
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn get_me(&self) -> anyhow::Result<BotIdentity> {
        self.call("getMe", json!({})).await
    }

    async fn create_forum_topic(&self, chat_id: i64, name: &str) -> anyhow::Result<ForumTopic> {
        self.call("createForumTopic", json!({ "chat_id": chat_id, "name": name })).await
    }

    async fn copy_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64> {
        let copied: MessageId = self
            .call("copyMessage", relay_payload(from_chat_id, message_id, target, true))
            .await?;
        Ok(copied.message_id)
    }

    async fn forward_message(&self, from_chat_id: i64, message_id: i64, target: Target) -> anyhow::Result<i64> {
        let forwarded: MessageId = self
            .call("forwardMessage", relay_payload(from_chat_id, message_id, target, false))
            .await?;
        Ok(forwarded.message_id)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<i64> {
        let sent: MessageId = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(sent.message_id)
    }

    async fn set_webhook(&self, url: &str, secret: Option<&str>) -> anyhow::Result<()> {
        let mut payload = json!({
            "url": url,
            "allowed_updates": ["message"],
            "drop_pending_updates": false,
            "max_connections": 100,
        });
        if let Some(secret) = secret {
            payload["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", payload).await?;
        Ok(())
    }

    async fn get_webhook_info(&self) -> anyhow::Result<WebhookInfo> {
        self.call("getWebhookInfo", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_strips_trailing_slash() {
        let api = HttpTelegramApi::new(Client::new(), "https://api.example/", "123:abc");
        assert_eq!(api.url("getMe"), "https://api.example/bot123:abc/getMe");
    }

    #[test]
    fn copy_payload_carries_thread_and_reply() {
        let target = Target { chat_id: -100, thread_id: Some(7), reply_to: Some(99) };
        let payload = relay_payload(555, 42, target, true);
        assert_eq!(payload["chat_id"], -100);
        assert_eq!(payload["from_chat_id"], 555);
        assert_eq!(payload["message_id"], 42);
        assert_eq!(payload["message_thread_id"], 7);
        assert_eq!(payload["reply_parameters"]["message_id"], 99);
        assert_eq!(payload["reply_parameters"]["allow_sending_without_reply"], true);
    }

    #[test]
    fn forward_payload_never_replies() {
        let target = Target { chat_id: 555, thread_id: None, reply_to: Some(99) };
        let payload = relay_payload(-100, 42, target, false);
        assert!(payload.get("reply_parameters").is_none());
        assert!(payload.get("message_thread_id").is_none());
    }

    #[test]
    fn telegram_response_deserializes() {
        let parsed: TelegramResponse<ForumTopic> = serde_json::from_value(json!({
            "ok": true,
            "result": { "message_thread_id": 12, "name": "Ada Lovelace", "icon_color": 7322096 }
        }))
        .unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result.unwrap().message_thread_id, 12);

        let failed: TelegramResponse<MessageId> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message to copy not found"
        }))
        .unwrap();
        assert!(!failed.ok);
        assert!(failed.description.unwrap().contains("not found"));
    }
}
