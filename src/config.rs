use std::{net::SocketAddr, str::FromStr};

use anyhow::{Context, anyhow};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// The staff group every user topic lives in.
    pub staff_chat: i64,
    pub webhook_url: Option<String>,
    pub webhook_path: String,
    pub secret_token: Option<String>,
    pub api_base: String,
    pub default_thread_id: i64,
    pub default_forward_id: i64,
    pub database_url: String,
    pub pool_size: u32,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .ok_or(anyhow!("TELEGRAM_BOT_TOKEN is not configured"))?;
        let staff_chat: i64 = parse_or(&get, "TELEGRAM_CHAT", 0)?;
        if staff_chat == 0 {
            return Err(anyhow!("TELEGRAM_CHAT is not configured"));
        }

        let webhook_path = get("TELEGRAM_WEBHOOK_PATH").unwrap_or("/telegramWebhook".to_owned());
        let webhook_path = if webhook_path.starts_with('/') {
            webhook_path
        } else {
            format!("/{webhook_path}")
        };

        Ok(Config {
            bot_token,
            staff_chat,
            webhook_url: get("TELEGRAM_WEBHOOK_URL"),
            webhook_path,
            secret_token: get("TELEGRAM_SECRET_TOKEN"),
            api_base: get("TELEGRAM_API_BASE").unwrap_or(DEFAULT_API_BASE.to_owned()),
            default_thread_id: parse_or(&get, "DEFAULT_THREAD_ID", 2)?,
            default_forward_id: parse_or(&get, "DEFAULT_FORWARD_ID", 2)?,
            database_url: get("DATABASE_URL").unwrap_or("sqlite://topic-relay.db".to_owned()),
            pool_size: parse_or(&get, "DATABASE_POOL_SIZE", 10)?,
            host: get("APP_HOST").unwrap_or("0.0.0.0".to_owned()),
            port: parse_or(&get, "PORT", 3000)?,
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} is not valid: {raw}")),
        None => Ok(default),
    }
}
