//! # Gatewayエンドポイント

pub mod health;
pub mod webhook;

pub use health::handle_health;
pub use webhook::handle_webhook;
