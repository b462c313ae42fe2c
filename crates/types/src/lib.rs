//! # Sponsor Roles 共有型定義
//!
//! GitHub Sponsors Webhook、GitHub Gist API、Discord REST APIで送受信される
//! JSON構造と、それらから組み立てるドメインモデルを提供する。
//!
//! ## 識別子の扱い
//! - GitHub: `login`（ハンドル）と `node_id`（不透明ID）の組でスポンサーを識別する
//! - Discord: Snowflakeは10進数文字列のまま保持する（u64に変換しない）

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GitHub Sponsors Webhook
// ---------------------------------------------------------------------------

/// GitHubアカウント。Webhookペイロードの `sponsor` / `sender` 等に現れる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubUser {
    /// ログイン名（ハンドル）
    pub login: String,
    /// 数値ID
    pub id: u64,
    /// GraphQL node ID（監査ログ検索のキーとしても使う）
    pub node_id: String,
}

/// スポンサーシップのティア。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubSponsorTier {
    /// ティアのnode ID（ロールマッピングのキー）
    pub node_id: String,
    /// 月額（セント）
    pub monthly_price_in_cents: u64,
    /// ティア名
    #[serde(default)]
    pub name: String,
}

/// スポンサーシップ本体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubSponsorship {
    pub node_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    /// スポンサーしている側
    pub sponsor: GithubUser,
    /// スポンサーされている側
    #[serde(default)]
    pub sponsorable: Option<GithubUser>,
    #[serde(default)]
    pub privacy_level: Option<String>,
    pub tier: GithubSponsorTier,
}

/// Webhookの `action` フィールド。
///
/// `created` と `cancelled` 以外（`edited`, `tier_changed`, `pending_cancellation` 等）は
/// すべて `Other` として受け取り、処理対象外とする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorshipAction {
    Created,
    Cancelled,
    #[serde(other)]
    Other,
}

/// `sponsorship` イベントのWebhookペイロード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorshipPayload {
    pub action: SponsorshipAction,
    pub sponsorship: GithubSponsorship,
    pub sender: GithubUser,
}

// ---------------------------------------------------------------------------
// GitHub Gist
// ---------------------------------------------------------------------------

/// `GET /users/{user}/gists` の1要素。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gist {
    pub id: String,
    /// 説明文。未設定のGistでは `null` になる。
    #[serde(default)]
    pub description: Option<String>,
    /// ファイル名 → ファイル情報
    #[serde(default)]
    pub files: HashMap<String, GistFile>,
}

/// Gist内のファイル情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistFile {
    pub filename: String,
    /// 生データ取得用URL
    pub raw_url: String,
}

// ---------------------------------------------------------------------------
// Discord REST
// ---------------------------------------------------------------------------

/// Discordユーザー。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    /// Snowflake
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// ギルドメンバー情報。`roles` はロールIDのSnowflake一覧。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub user: Option<DiscordUser>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// チャンネルメッセージ（監査ログ履歴の1件）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    /// 本文中でメンションされたユーザー
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

/// `POST /channels/{channel}/messages` のリクエストボディ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMessage {
    pub content: String,
    pub allowed_mentions: AllowedMentions,
}

/// 通知を許可するメンション。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

/// `PATCH /guilds/{guild}/members/{user}` のリクエストボディ（ロール一覧の置換）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyMemberRoles {
    pub roles: Vec<String>,
}

// ---------------------------------------------------------------------------
// ドメインモデル
// ---------------------------------------------------------------------------

/// 外部システム（GitHub）側のアカウント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccount {
    /// ハンドル（login）
    pub handle: String,
    /// 不透明ID（node_id）
    pub external_id: String,
}

impl From<GithubUser> for ExternalAccount {
    fn from(user: GithubUser) -> Self {
        Self {
            handle: user.login,
            external_id: user.node_id,
        }
    }
}

/// スポンサーシップのティア。ロールマッピングのキーとしてのみ使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorshipTier {
    pub opaque_id: String,
    pub monthly_price_cents: u64,
    pub name: String,
}

impl SponsorshipTier {
    /// 月額をドル表記に整形する（`$5`, `$12.50`）。
    pub fn format_price(&self) -> String {
        let dollars = self.monthly_price_cents / 100;
        let cents = self.monthly_price_cents % 100;
        if cents == 0 {
            format!("${dollars}")
        } else {
            format!("${dollars}.{cents:02}")
        }
    }
}

impl From<GithubSponsorTier> for SponsorshipTier {
    fn from(tier: GithubSponsorTier) -> Self {
        Self {
            opaque_id: tier.node_id,
            monthly_price_cents: tier.monthly_price_in_cents,
            name: tier.name,
        }
    }
}

/// 検証済みペイロードから一度だけ組み立てる、不変のスポンサーシップイベント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorshipEvent {
    pub action: SponsorshipAction,
    pub sponsor: ExternalAccount,
    pub tier: SponsorshipTier,
    pub sender: ExternalAccount,
}

impl From<SponsorshipPayload> for SponsorshipEvent {
    fn from(payload: SponsorshipPayload) -> Self {
        Self {
            action: payload.action,
            sponsor: payload.sponsorship.sponsor.into(),
            tier: payload.sponsorship.tier.into(),
            sender: payload.sender.into(),
        }
    }
}

/// メタデータファイルから抽出した、内部システム（Discord）側のアカウントID。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub internal_id: String,
}

/// 解決済みの内部アカウント。
///
/// 現在のロール一覧はここには持たない。ロール調整の直前に
/// `GuildMember.roles` から読み直し、それを現在値として扱う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalAccount {
    pub id: String,
    pub username: String,
}

impl From<DiscordUser> for InternalAccount {
    fn from(user: DiscordUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
