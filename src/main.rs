use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use topic_relay::{
    AppState, config::Config, db, messages::MessageLedger, relay::RelayEngine,
    telegram::{HttpTelegramApi, TelegramApi}, users::UserStore, webhook::{self, WebhookSecret},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "failed to start application");
        return Err(err);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db_pool = db::connect(&config).await?;

    let api: Arc<dyn TelegramApi> = Arc::new(HttpTelegramApi::new(
        reqwest::Client::new(),
        &config.api_base,
        &config.bot_token,
    ));
    let bot = api.get_me().await.context("failed to fetch bot identity")?;
    tracing::info!(bot_id = bot.id, username = ?bot.username, "bot identity loaded");

    match &config.webhook_url {
        Some(url) => {
            api.set_webhook(url, config.secret_token.as_deref()).await?;
            tracing::info!(%url, "webhook set");
        }
        None => tracing::warn!("TELEGRAM_WEBHOOK_URL not configured - webhook not set"),
    }

    let engine = RelayEngine::new(
        UserStore::new(db_pool.clone()),
        MessageLedger::new(db_pool.clone(), config.default_forward_id),
        api.clone(),
        Arc::new(bot),
        config.staff_chat,
    );
    let app_state = AppState {
        engine,
        api,
        secret: WebhookSecret(config.secret_token.as_deref().map(Arc::from)),
    };

    let app = Router::new()
        .merge(webhook::router(&config.webhook_path))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, path = %config.webhook_path, "application is running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    db_pool.close().await;
    Ok(())
}
