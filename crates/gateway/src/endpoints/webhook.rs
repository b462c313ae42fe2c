//! # POST / — GitHub Sponsors Webhook
//!
//! 署名を検証したうえでスポンサーシップイベントを受け付ける。
//! 検証に成功した時点で200を返し、イベント処理はバックグラウンドタスクで続行する。
//!
//! | 条件 | ステータス |
//! |------|-----------|
//! | POST以外 | 405 |
//! | 署名ヘッダなし・不一致 | 401 |
//! | 署名は正しいがJSONでない | 400 |
//! | スポンサーシップ以外のイベント（ping等） | 200（何もしない） |
//! | スポンサーシップイベント | 200（非同期処理） |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sponsor_types::{SponsorshipEvent, SponsorshipPayload};

use crate::config::GatewayState;
use crate::dispatch::EventDispatcher;
use crate::error::GatewayError;

/// 署名ヘッダ名
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// 配信IDヘッダ名（ログ用）
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Webhookの受付。
pub async fn handle_webhook(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    if method != Method::POST {
        return Ok((
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({
                "success": false,
                "message": "Can only POST to this endpoint.",
            })),
        )
            .into_response());
    }

    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // ペイロードのどのフィールドも、署名検証より前には参照しない
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !sponsor_crypto::verify(&body, signature, state.webhook_secret.as_bytes()) {
        tracing::warn!(?delivery, "Webhook署名の検証に失敗");
        return Err(GatewayError::Unauthorized(
            "Request body digest did not match signature.".to_string(),
        ));
    }

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("JSONのパースに失敗: {e}")))?;
    let payload: SponsorshipPayload = match serde_json::from_value(value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(?delivery, error = %e, "スポンサーシップ以外のイベントを無視");
            return Ok(StatusCode::OK.into_response());
        }
    };

    let event = SponsorshipEvent::from(payload);
    tracing::info!(
        ?delivery,
        action = ?event.action,
        sponsor = %event.sponsor.handle,
        "スポンサーシップイベントを受信"
    );
    spawn_dispatch(Arc::clone(&state.dispatcher), event, delivery);

    Ok(StatusCode::OK.into_response())
}

/// イベント処理をバックグラウンドで実行する。
///
/// 通信失敗はここでログに残すのみで、監査ログには投稿しない。
pub fn spawn_dispatch(
    dispatcher: Arc<EventDispatcher>,
    event: SponsorshipEvent,
    delivery: Option<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match dispatcher.dispatch(&event).await {
            Ok(outcome) => tracing::info!(
                ?delivery,
                sponsor = %event.sponsor.handle,
                ?outcome,
                "イベント処理完了"
            ),
            Err(e) => tracing::error!(
                ?delivery,
                sponsor = %event.sponsor.handle,
                error = %e,
                "イベント処理を中断"
            ),
        }
    })
}
