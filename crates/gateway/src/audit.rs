//! # 監査ログ
//!
//! 処理結果を人が読む形でDiscordの監査チャンネルに投稿する。
//! 監査チャンネルは唯一の診断手段であり、解約時の身元復元の検索対象にもなる。
//! そのため、スポンサーに関する投稿には `<@id>` と `` `login:node_id` `` を必ず含める。

use std::sync::Arc;

use sponsor_types::{AllowedMentions, CreateMessage, ExternalAccount, InternalAccount};

use crate::discord::DiscordApi;
use crate::reconcile::RoleMode;

/// 監査チャンネルへの投稿内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub content: String,
    /// 通知（メンション）を許可するユーザーID
    pub mention: Option<String>,
}

impl Notice {
    /// 誰にもメンション通知を送らない投稿。
    pub fn plain(content: String) -> Self {
        Self {
            content,
            mention: None,
        }
    }

    /// `user_id` へのメンション通知だけを許可する投稿。
    pub fn mentioning(content: String, user_id: &str) -> Self {
        Self {
            content,
            mention: Some(user_id.to_string()),
        }
    }

    pub fn to_create_message(&self) -> CreateMessage {
        CreateMessage {
            content: self.content.clone(),
            allowed_mentions: AllowedMentions {
                parse: Vec::new(),
                users: self.mention.iter().cloned().collect(),
            },
        }
    }

    pub fn no_metadata_entry(handle: &str) -> Self {
        Self::plain(format!(
            "{handle} doesn't have a Gist with their Discord information."
        ))
    }

    pub fn no_metadata_file(handle: &str) -> Self {
        Self::plain(format!(
            "{handle} doesn't have a `ME.txt` file on their Gist."
        ))
    }

    pub fn malformed_metadata(handle: &str) -> Self {
        Self::plain(format!(
            "{handle}'s `ME.txt` data didn't match the expected format."
        ))
    }

    pub fn unknown_account(handle: &str, internal_id: &str) -> Self {
        Self::plain(format!(
            "{handle}'s Discord account they provided (`{internal_id}`) does not exist."
        ))
    }

    pub fn unrecoverable_cancellation(sponsor: &ExternalAccount) -> Self {
        Self::plain(format!(
            "{} (`{}`) just cancelled and they've deleted their Gist and I can't find any logs so I can't remove their roles!",
            sponsor.handle, sponsor.external_id
        ))
    }

    pub fn no_configured_roles(
        account: &InternalAccount,
        sponsor: &ExternalAccount,
        mode: RoleMode,
    ) -> Self {
        let action = match mode {
            RoleMode::Grant => "apply",
            RoleMode::Revoke => "remove",
        };
        Self::mentioning(
            format!(
                "{} just {} but there are no configured roles to {action}!",
                tag(account, sponsor),
                mode.verb()
            ),
            &account.id,
        )
    }

    pub fn not_a_member(
        account: &InternalAccount,
        sponsor: &ExternalAccount,
        mode: RoleMode,
    ) -> Self {
        Self::mentioning(
            format!(
                "{} just {} but isn't in the server!",
                tag(account, sponsor),
                mode.verb()
            ),
            &account.id,
        )
    }

    pub fn role_update_failed(
        account: &InternalAccount,
        sponsor: &ExternalAccount,
        mode: RoleMode,
        status: u16,
        error: &serde_json::Value,
    ) -> Self {
        let action = match mode {
            RoleMode::Grant => "applying roles",
            RoleMode::Revoke => "removing their roles",
        };
        let detail = serde_json::to_string_pretty(error).unwrap_or_else(|_| error.to_string());
        Self::mentioning(
            format!(
                "{} just {} but {action} failed (HTTP {status}).\n```\n{detail}\n```",
                tag(account, sponsor),
                mode.verb()
            ),
            &account.id,
        )
    }

    pub fn sponsored(account: &InternalAccount, sponsor: &ExternalAccount, price: &str) -> Self {
        Self::mentioning(
            format!(
                "{} just sponsored for {price} a month!",
                tag(account, sponsor)
            ),
            &account.id,
        )
    }

    pub fn cancelled(account: &InternalAccount, sponsor: &ExternalAccount) -> Self {
        Self::mentioning(
            format!(
                "{} just cancelled and their sponsor roles were removed.",
                tag(account, sponsor)
            ),
            &account.id,
        )
    }
}

/// `<@id> (`login:node_id`)` 形式のタグ。解約時の履歴検索はこの形式に依存する。
fn tag(account: &InternalAccount, sponsor: &ExternalAccount) -> String {
    format!(
        "<@{}> (`{}:{}`)",
        account.id, sponsor.handle, sponsor.external_id
    )
}

/// `content` が `tag()` の形式で `external_id` のスポンサーを記録しているか。
///
/// node_idは他ユーザーのnode_idの先頭部分と一致しうるため、
/// 区切りの `:` と閉じバッククォートまで含めたトークン全体で比較する。
pub fn tags_sponsor(content: &str, external_id: &str) -> bool {
    !external_id.is_empty() && content.contains(&format!(":{external_id}`"))
}

/// 監査ログの投稿先を抽象化するトレイト。
///
/// 投稿は完了を待たない（fire-and-forget）。投稿の失敗はイベント処理に影響しない。
pub trait AuditSink: Send + Sync {
    fn post(&self, notice: Notice);
}

/// Discordチャンネルへ投稿する `AuditSink` 実装。
pub struct DiscordAuditSink {
    discord: Arc<dyn DiscordApi>,
    channel_id: String,
}

impl DiscordAuditSink {
    pub fn new(discord: Arc<dyn DiscordApi>, channel_id: String) -> Self {
        Self {
            discord,
            channel_id,
        }
    }
}

impl AuditSink for DiscordAuditSink {
    fn post(&self, notice: Notice) {
        let discord = Arc::clone(&self.discord);
        let channel_id = self.channel_id.clone();
        tokio::spawn(async move {
            let message = notice.to_create_message();
            if let Err(e) = discord.create_message(&channel_id, &message).await {
                tracing::warn!(error = %e, content = %notice.content, "監査ログの投稿に失敗");
            }
        });
    }
}
