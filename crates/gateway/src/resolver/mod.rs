//! # 身元解決
//!
//! GitHubのスポンサーをDiscordアカウントに対応付ける。
//!
//! ## モジュール構成
//! - `metadata`: スポンサーのGistからメタデータファイルを探し、Discord IDを抽出する
//! - `account`: Discord IDの直接照会と、監査ログ履歴からの復元

mod account;
mod metadata;

pub use account::{AccountResolver, IdentityFailure, Resolution};
pub use metadata::MetadataFetcher;
