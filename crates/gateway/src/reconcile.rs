//! # ロール調整
//!
//! ティアに対応するロール集合を、内部アカウントのギルドメンバー情報へ付与・剥奪する。
//! ロール一覧は常に「現在のロール ∪ 対象」または「現在のロール − 対象」で再計算し、
//! 丸ごと別の集合で置き換えることはない。

use std::sync::Arc;

use sponsor_types::InternalAccount;

use crate::discord::{DiscordApi, RoleUpdate};
use crate::error::GatewayError;

/// 付与か剥奪か。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMode {
    Grant,
    Revoke,
}

impl RoleMode {
    /// 監査ログ用の動詞
    pub fn verb(self) -> &'static str {
        match self {
            RoleMode::Grant => "sponsored",
            RoleMode::Revoke => "cancelled",
        }
    }
}

/// ロール調整の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// 更新済み。更新後のロール一覧を持つ。
    Applied { roles: Vec<String> },
    /// 対象ロールが設定されていない（何もしていない）
    NoTargetRoles,
    /// ギルドのメンバーではない（何もしていない）
    NotAMember,
    /// Discordが更新を拒否した。自動修復は行わない。
    PartialFailure {
        status: u16,
        error: serde_json::Value,
    },
}

/// 現在のロールと対象ロールから、置換後のロール一覧を計算する。
///
/// 既存ロールの順序を保ち、付与では未保持のものだけを末尾に足す。
pub fn next_roles(current: &[String], target: &[String], mode: RoleMode) -> Vec<String> {
    match mode {
        RoleMode::Grant => {
            let mut roles = current.to_vec();
            for role in target {
                if !roles.contains(role) {
                    roles.push(role.clone());
                }
            }
            roles
        }
        RoleMode::Revoke => current
            .iter()
            .filter(|r| !target.contains(r))
            .cloned()
            .collect(),
    }
}

/// ギルドメンバーのロールを調整する。
pub struct RoleReconciler {
    discord: Arc<dyn DiscordApi>,
    guild_id: String,
}

impl RoleReconciler {
    pub fn new(discord: Arc<dyn DiscordApi>, guild_id: String) -> Self {
        Self { discord, guild_id }
    }

    /// `roles` を `account` に付与または剥奪する。
    ///
    /// 既に保持しているロールの付与や、保持していないロールの剥奪でも更新リクエストは送る。
    pub async fn apply(
        &self,
        account: &InternalAccount,
        roles: &[String],
        mode: RoleMode,
    ) -> Result<ReconcileOutcome, GatewayError> {
        if roles.is_empty() {
            return Ok(ReconcileOutcome::NoTargetRoles);
        }

        let Some(member) = self.discord.get_member(&self.guild_id, &account.id).await? else {
            return Ok(ReconcileOutcome::NotAMember);
        };

        let updated = next_roles(&member.roles, roles, mode);
        tracing::debug!(
            user_id = %account.id,
            ?mode,
            before = ?member.roles,
            after = ?updated,
            "ロール一覧を更新"
        );

        match self
            .discord
            .modify_member_roles(&self.guild_id, &account.id, &updated)
            .await?
        {
            RoleUpdate::Updated(member) => Ok(ReconcileOutcome::Applied {
                roles: member.roles,
            }),
            RoleUpdate::Rejected { status, body } => Ok(ReconcileOutcome::PartialFailure {
                status,
                error: body,
            }),
        }
    }
}
