//! # イベント振り分け
//!
//! 署名検証済みのスポンサーシップイベントを `action` ごとに処理する。
//!
//! ## 状態遷移
//! ```text
//! Received → Verified → Resolving → Reconciling → Notified
//! ```
//! `Received → Verified` はWebhookエンドポイントが担う。ここでは `Resolving` 以降を扱い、
//! 各終端で監査ログをちょうど1件投稿する（通信失敗による中断を除く）。
//! `created` / `cancelled` 以外の `action` は何もせずに終える。

use std::sync::Arc;

use sponsor_types::{ExternalAccount, InternalAccount, SponsorshipAction, SponsorshipEvent};

use crate::audit::{AuditSink, Notice};
use crate::config::{GatewayConfig, RoleMapping};
use crate::discord::DiscordApi;
use crate::error::GatewayError;
use crate::github::GithubApi;
use crate::reconcile::{ReconcileOutcome, RoleMode, RoleReconciler};
use crate::resolver::{AccountResolver, IdentityFailure, MetadataFetcher, Resolution};

/// イベント処理の終端状態。
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 処理対象外の `action`（通知もロール変更もしない）
    Ignored,
    /// 身元を解決できなかった（報告済み）
    Unresolved(IdentityFailure),
    /// ティアに対応するロールがない
    NoConfiguredRoles,
    /// 解決したアカウントがギルドメンバーではない
    NotAMember,
    /// Discordがロール更新を拒否した
    RoleUpdateFailed { status: u16 },
    /// ロールを付与した
    Granted { roles: Vec<String> },
    /// ロールを剥奪した
    Revoked { roles: Vec<String> },
}

/// スポンサーシップイベントの処理本体。
pub struct EventDispatcher {
    resolver: AccountResolver,
    reconciler: RoleReconciler,
    role_mapping: RoleMapping,
    audit: Arc<dyn AuditSink>,
}

impl EventDispatcher {
    pub fn new(
        config: &GatewayConfig,
        github: Arc<dyn GithubApi>,
        discord: Arc<dyn DiscordApi>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let resolver = AccountResolver::new(
            MetadataFetcher::new(github),
            Arc::clone(&discord),
            Arc::clone(&audit),
            config.log_channel_id.clone(),
        );
        Self {
            resolver,
            reconciler: RoleReconciler::new(discord, config.guild_id.clone()),
            role_mapping: config.role_mapping.clone(),
            audit,
        }
    }

    /// イベントを処理する。通信失敗は `Err` として返し、監査ログには残さない。
    pub async fn dispatch(
        &self,
        event: &SponsorshipEvent,
    ) -> Result<DispatchOutcome, GatewayError> {
        let mode = match event.action {
            SponsorshipAction::Created => RoleMode::Grant,
            SponsorshipAction::Cancelled => RoleMode::Revoke,
            SponsorshipAction::Other => return Ok(DispatchOutcome::Ignored),
        };

        let resolution = match mode {
            RoleMode::Grant => self.resolver.resolve(&event.sponsor, false).await?,
            RoleMode::Revoke => self.resolver.resolve_for_cancellation(&event.sponsor).await?,
        };
        let account = match resolution {
            Resolution::Resolved(account) => account,
            Resolution::NotFound(failure) | Resolution::Suppressed(failure) => {
                return Ok(DispatchOutcome::Unresolved(failure));
            }
        };

        let roles = self.role_mapping.roles_for(&event.tier.opaque_id);
        let outcome = self.reconciler.apply(&account, &roles, mode).await?;
        Ok(self.report(event, &account, mode, outcome))
    }

    /// ロール調整の結果を監査ログに投稿し、終端状態に変換する。
    fn report(
        &self,
        event: &SponsorshipEvent,
        account: &InternalAccount,
        mode: RoleMode,
        outcome: ReconcileOutcome,
    ) -> DispatchOutcome {
        let sponsor: &ExternalAccount = &event.sponsor;
        let (notice, result) = match outcome {
            ReconcileOutcome::NoTargetRoles => (
                Notice::no_configured_roles(account, sponsor, mode),
                DispatchOutcome::NoConfiguredRoles,
            ),
            ReconcileOutcome::NotAMember => (
                Notice::not_a_member(account, sponsor, mode),
                DispatchOutcome::NotAMember,
            ),
            ReconcileOutcome::PartialFailure { status, error } => (
                Notice::role_update_failed(account, sponsor, mode, status, &error),
                DispatchOutcome::RoleUpdateFailed { status },
            ),
            ReconcileOutcome::Applied { roles } => match mode {
                RoleMode::Grant => (
                    Notice::sponsored(account, sponsor, &event.tier.format_price()),
                    DispatchOutcome::Granted { roles },
                ),
                RoleMode::Revoke => (
                    Notice::cancelled(account, sponsor),
                    DispatchOutcome::Revoked { roles },
                ),
            },
        };
        self.audit.post(notice);
        result
    }
}
