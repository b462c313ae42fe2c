//! # GET /healthz
//!
//! デプロイ先の死活監視用。

/// GET /healthz — 常に `ok` を返す。
pub async fn handle_health() -> &'static str {
    "ok"
}
