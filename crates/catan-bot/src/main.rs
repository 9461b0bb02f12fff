//! Robot client binary: connect to a game server and play.

use catan_bot::{BotClient, BotConfig, Strategy};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = std::env::var("SERVER_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080".into());
    let nickname = std::env::var("BOT_NICKNAME").unwrap_or_else(|_| "robot".into());

    let mut config = BotConfig::default();
    if std::env::var("BOT_STRATEGY").as_deref() == Ok("fast") {
        config.strategy = Strategy::Fast;
    }
    if std::env::var("BOT_NO_TRADE").is_ok() {
        config.trade_flag = false;
    }

    info!(%url, %nickname, "starting robot client");

    let (client, actions_rx) = BotClient::new(nickname, config);
    catan_bot::client::run_client(&url, client, actions_rx).await?;
    Ok(())
}
