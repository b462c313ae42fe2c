//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ `GatewayConfig` に集約し、各コンポーネントへ明示的に渡す。

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;

use crate::dispatch::EventDispatcher;

/// グローバルなロール指定の環境変数名
const GLOBAL_ROLES_VAR: &str = "SPONSOR_ROLES";
/// ティアごとのロール指定の環境変数プレフィックス（`SPONSOR_ROLES_<tier node_id>`）
const TIER_ROLES_PREFIX: &str = "SPONSOR_ROLES_";

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api/v10";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// ティア → 付与ロールの対応表。
///
/// グローバル指定が空でなければ全ティアに優先する。どちらもなければ空集合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    global: Vec<String>,
    per_tier: HashMap<String, Vec<String>>,
}

impl RoleMapping {
    pub fn new(global: Vec<String>, per_tier: HashMap<String, Vec<String>>) -> Self {
        Self { global, per_tier }
    }

    /// ティアに対応するロール一覧を返す。
    pub fn roles_for(&self, tier_id: &str) -> Vec<String> {
        if !self.global.is_empty() {
            return self.global.clone();
        }
        self.per_tier.get(tier_id).cloned().unwrap_or_default()
    }

    /// `SPONSOR_ROLES` / `SPONSOR_ROLES_<tier>` 形式の変数から対応表を組み立てる。
    fn from_vars(vars: &HashMap<String, String>) -> Self {
        let global = vars
            .get(GLOBAL_ROLES_VAR)
            .map(|v| parse_role_list(v))
            .unwrap_or_default();

        let per_tier = vars
            .iter()
            .filter_map(|(key, value)| {
                let tier = key.strip_prefix(TIER_ROLES_PREFIX)?;
                let roles = parse_role_list(value);
                (!tier.is_empty() && !roles.is_empty()).then(|| (tier.to_string(), roles))
            })
            .collect();

        Self::new(global, per_tier)
    }
}

/// カンマ区切りのロールID一覧をパースする。空要素は捨てる。
fn parse_role_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Gatewayの設定。
pub struct GatewayConfig {
    /// Discord Botトークン
    pub discord_token: String,
    /// GitHub Webhookの共有シークレット
    pub webhook_secret: String,
    /// 監査ログを書き込むDiscordチャンネルID
    pub log_channel_id: String,
    /// ロールを管理するDiscordギルドID
    pub guild_id: String,
    /// ティア → ロールの対応表
    pub role_mapping: RoleMapping,
    /// GitHub APIトークン（レート制限緩和用、任意）
    pub github_token: Option<String>,
    /// GitHub APIのベースURL
    pub github_api_url: String,
    /// Discord APIのベースURL
    pub discord_api_url: String,
    /// HTTPサーバーのバインドアドレス
    pub bind_addr: String,
}

impl GatewayConfig {
    /// プロセスの環境変数から設定を読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// 変数一覧から設定を組み立てる。必須変数が欠けていればエラー。
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let required = |name: &str| -> anyhow::Result<String> {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("環境変数 {name} が設定されていません"))
        };
        let optional = |name: &str| -> Option<String> {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            webhook_secret: required("GITHUB_WEBHOOK_SECRET")?,
            log_channel_id: required("LOG_CHANNEL")?,
            guild_id: required("DISCORD_GUILD_ID")?,
            role_mapping: RoleMapping::from_vars(&vars),
            github_token: optional("GITHUB_TOKEN"),
            github_api_url: optional("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            discord_api_url: optional("DISCORD_API_URL")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_URL.to_string()),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// Webhook署名検証用シークレット
    pub webhook_secret: String,
    /// イベント処理本体
    pub dispatcher: Arc<EventDispatcher>,
}
