//! # アカウント解決
//!
//! メタデータから得たDiscord IDを直接照会して内部アカウントを確定する。
//! 解約時にメタデータが失われている場合は、監査ログ履歴を新しい順に走査し、
//! スポンサーのnode_idを含む過去の投稿でタグ付けされたアカウントを復元する。
//!
//! 解決は「ちょうど1つの実在アカウント」か「解決不能」のどちらかで終わる。
//! 推測したアカウントにロールを適用することはない。

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sponsor_types::{ExternalAccount, InternalAccount, Message};

use crate::audit::{tags_sponsor, AuditSink, Notice};
use crate::discord::DiscordApi;
use crate::error::GatewayError;
use crate::pagination::AuditHistory;

use super::metadata::{MetadataFetcher, MetadataOutcome};

/// 本文中のユーザーメンション（`<@id>` / `<@!id>`）
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(?P<id>\d+)>").expect("invalid mention pattern"));

/// 身元解決の失敗理由。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFailure {
    /// メタデータGistがない
    NoMetadataEntry,
    /// メタデータGistに `ME.txt` がない
    NoMetadataFile,
    /// `ME.txt` の内容が不正
    Malformed,
    /// 申告されたDiscordアカウントが存在しない
    UnknownAccount(String),
    /// メタデータも監査ログの記録もない
    NoAuditRecord,
}

impl IdentityFailure {
    /// メタデータ自体が見つからない失敗か（監査ログからの復元対象）
    pub fn is_missing_metadata(&self) -> bool {
        matches!(
            self,
            IdentityFailure::NoMetadataEntry | IdentityFailure::NoMetadataFile
        )
    }

    fn notice(&self, sponsor: &ExternalAccount) -> Notice {
        match self {
            IdentityFailure::NoMetadataEntry => Notice::no_metadata_entry(&sponsor.handle),
            IdentityFailure::NoMetadataFile => Notice::no_metadata_file(&sponsor.handle),
            IdentityFailure::Malformed => Notice::malformed_metadata(&sponsor.handle),
            IdentityFailure::UnknownAccount(id) => Notice::unknown_account(&sponsor.handle, id),
            IdentityFailure::NoAuditRecord => Notice::unrecoverable_cancellation(sponsor),
        }
    }
}

/// 身元解決の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(InternalAccount),
    /// 失敗したが通知は抑止した。後続の判断は呼び出し元に委ねる。
    Suppressed(IdentityFailure),
    /// 失敗し、監査ログに報告済み
    NotFound(IdentityFailure),
}

/// 監査ログのメッセージからタグ付けされたユーザーIDを取り出す。
///
/// `mentions` の先頭を優先し、空なら本文中の最初のメンションを使う。
pub fn mentioned_user_id(message: &Message) -> Option<String> {
    if let Some(user) = message.mentions.first() {
        return Some(user.id.clone());
    }
    MENTION_PATTERN
        .captures(&message.content)
        .and_then(|caps| caps.name("id"))
        .map(|id| id.as_str().to_string())
}

/// GitHubのスポンサーをDiscordアカウントへ解決する。
pub struct AccountResolver {
    metadata: MetadataFetcher,
    discord: Arc<dyn DiscordApi>,
    audit: Arc<dyn AuditSink>,
    log_channel_id: String,
}

impl AccountResolver {
    pub fn new(
        metadata: MetadataFetcher,
        discord: Arc<dyn DiscordApi>,
        audit: Arc<dyn AuditSink>,
        log_channel_id: String,
    ) -> Self {
        Self {
            metadata,
            discord,
            audit,
            log_channel_id,
        }
    }

    /// メタデータ経由でスポンサーを解決する。
    ///
    /// `suppress_notify` が偽なら、失敗時にちょうど1件の監査ログを投稿する。
    pub async fn resolve(
        &self,
        sponsor: &ExternalAccount,
        suppress_notify: bool,
    ) -> Result<Resolution, GatewayError> {
        let failure = match self.metadata.resolve_linked_identity(&sponsor.handle).await? {
            MetadataOutcome::Found(identity) => {
                match self.lookup(&identity.internal_id).await? {
                    Some(account) => return Ok(Resolution::Resolved(account)),
                    None => IdentityFailure::UnknownAccount(identity.internal_id),
                }
            }
            MetadataOutcome::NoEntry => IdentityFailure::NoMetadataEntry,
            MetadataOutcome::NoFile => IdentityFailure::NoMetadataFile,
            MetadataOutcome::Malformed => IdentityFailure::Malformed,
        };

        tracing::info!(handle = %sponsor.handle, ?failure, suppress_notify, "スポンサーを解決できません");
        if suppress_notify {
            Ok(Resolution::Suppressed(failure))
        } else {
            Ok(self.report(sponsor, failure))
        }
    }

    /// 解約イベント用の解決。メタデータが見つからない場合のみ監査ログ履歴へフォールバックする。
    ///
    /// メタデータ欠落の通知はフォールバックの結果が出るまで保留するため、
    /// どの失敗経路でも監査ログはちょうど1件になる。
    pub async fn resolve_for_cancellation(
        &self,
        sponsor: &ExternalAccount,
    ) -> Result<Resolution, GatewayError> {
        match self.resolve(sponsor, true).await? {
            Resolution::Suppressed(failure) if failure.is_missing_metadata() => {}
            Resolution::Suppressed(failure) => return Ok(self.report(sponsor, failure)),
            other => return Ok(other),
        }

        let Some(internal_id) = self.search_audit_log(sponsor).await? else {
            return Ok(self.report(sponsor, IdentityFailure::NoAuditRecord));
        };

        tracing::info!(
            handle = %sponsor.handle,
            user_id = %internal_id,
            "監査ログからアカウントを復元"
        );
        match self.lookup(&internal_id).await? {
            Some(account) => Ok(Resolution::Resolved(account)),
            None => Ok(self.report(sponsor, IdentityFailure::UnknownAccount(internal_id))),
        }
    }

    /// 監査ログ履歴を新しい順に走査し、`sponsor` のnode_idをタグとして含み、かつ
    /// ユーザーをタグ付けしている最初の投稿からユーザーIDを取り出す。
    pub async fn search_audit_log(
        &self,
        sponsor: &ExternalAccount,
    ) -> Result<Option<String>, GatewayError> {
        if sponsor.external_id.is_empty() {
            return Ok(None);
        }

        let hit = AuditHistory::new(self.discord.as_ref(), &self.log_channel_id)
            .find(|m| {
                tags_sponsor(&m.content, &sponsor.external_id) && mentioned_user_id(m).is_some()
            })
            .await?;
        Ok(hit.as_ref().and_then(mentioned_user_id))
    }

    async fn lookup(&self, internal_id: &str) -> Result<Option<InternalAccount>, GatewayError> {
        Ok(self
            .discord
            .get_user(internal_id)
            .await?
            .map(InternalAccount::from))
    }

    fn report(&self, sponsor: &ExternalAccount, failure: IdentityFailure) -> Resolution {
        self.audit.post(failure.notice(sponsor));
        Resolution::NotFound(failure)
    }
}
