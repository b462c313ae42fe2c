//! # Sponsor Roles Gateway
//!
//! GitHub Sponsorsのスポンサーシップ作成・解約をWebhookで受け取り、
//! スポンサーのDiscordアカウントのロールを同期する。
//!
//! ## 役割
//! - Webhook署名検証（HMAC-SHA256）
//! - スポンサーのGistに置かれたメタデータからDiscordアカウントを解決
//! - ティアに対応するロールの付与・剥奪
//! - 結果を監査チャンネルに投稿（解約時の身元復元にも使う）
//!
//! ## API エンドポイント
//! - `POST /`, `POST /api` — GitHub Sponsors Webhook
//! - `GET /healthz` — 死活監視

mod audit;
mod config;
mod discord;
mod dispatch;
mod endpoints;
mod error;
mod github;
mod pagination;
mod reconcile;
mod resolver;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use audit::{AuditSink, DiscordAuditSink};
use config::{GatewayConfig, GatewayState};
use discord::{DiscordApi, DiscordClient};
use dispatch::EventDispatcher;
use github::{GithubApi, GithubClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // 環境変数の読み込み
    let config = GatewayConfig::from_env()?;

    let github: Arc<dyn GithubApi> = Arc::new(GithubClient::new(
        &config.github_api_url,
        config.github_token.clone(),
    )?);
    let discord: Arc<dyn DiscordApi> = Arc::new(DiscordClient::new(
        &config.discord_api_url,
        config.discord_token.clone(),
    )?);
    let audit: Arc<dyn AuditSink> = Arc::new(DiscordAuditSink::new(
        Arc::clone(&discord),
        config.log_channel_id.clone(),
    ));

    if config.github_token.is_none() {
        tracing::warn!("GITHUB_TOKENが未設定です。GitHub APIは匿名のレート制限で呼び出されます");
    }

    let dispatcher = Arc::new(EventDispatcher::new(&config, github, discord, audit));
    let state = Arc::new(GatewayState {
        webhook_secret: config.webhook_secret.clone(),
        dispatcher,
    });

    let app = axum::Router::new()
        .route("/", axum::routing::any(endpoints::handle_webhook))
        .route("/api", axum::routing::any(endpoints::handle_webhook))
        .route("/healthz", axum::routing::get(endpoints::handle_health))
        .with_state(state);

    tracing::info!(
        guild_id = %config.guild_id,
        log_channel = %config.log_channel_id,
        "Gatewayを {} で起動します",
        config.bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
