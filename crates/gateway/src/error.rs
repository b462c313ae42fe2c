//! # Gateway エラー型
//!
//! 通信失敗など、イベント処理そのものを中断させるエラーを表す。
//! 身元解決やロール調整の失敗は監査ログで報告する通常の結果であり、ここには含めない。

use axum::http::StatusCode;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 外部API（GitHub / Discord）との通信に失敗
    #[error("外部APIとの通信に失敗: {0}")]
    Upstream(String),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// Webhook署名の検証に失敗
    #[error("{0}")]
    Unauthorized(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
