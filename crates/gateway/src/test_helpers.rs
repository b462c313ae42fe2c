//! # テスト用共通ヘルパー
//!
//! GitHub / Discord / 監査ログのインメモリ実装と、モックHTTPサーバーの起動。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sponsor_types::{
    CreateMessage, DiscordUser, ExternalAccount, Gist, GistFile, GuildMember, Message,
    SponsorshipAction, SponsorshipEvent, SponsorshipTier,
};

use crate::audit::{AuditSink, Notice};
use crate::config::{GatewayConfig, RoleMapping};
use crate::discord::{DiscordApi, RoleUpdate};
use crate::error::GatewayError;
use crate::github::GithubApi;

/// テスト用モックHTTPサーバーを起動し、ポート番号を返す。
pub async fn serve(app: axum::Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

pub fn roles(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|r| r.to_string()).collect()
}

pub fn gist(id: &str, description: Option<&str>, files: &[(&str, &str)]) -> Gist {
    Gist {
        id: id.to_string(),
        description: description.map(str::to_string),
        files: files
            .iter()
            .map(|(name, raw_url)| {
                (
                    name.to_string(),
                    GistFile {
                        filename: name.to_string(),
                        raw_url: raw_url.to_string(),
                    },
                )
            })
            .collect(),
    }
}

pub fn message(id: &str, content: &str, mentions: &[&str]) -> Message {
    Message {
        id: id.to_string(),
        content: content.to_string(),
        mentions: mentions
            .iter()
            .map(|m| DiscordUser {
                id: m.to_string(),
                username: String::new(),
            })
            .collect(),
    }
}

/// GitHubハンドル `alice`、node_id `MDQ6VXNlcjI=` のスポンサー
pub fn sponsor() -> ExternalAccount {
    ExternalAccount {
        handle: "alice".to_string(),
        external_id: "MDQ6VXNlcjI=".to_string(),
    }
}

/// `alice` の月額$5のスポンサーシップイベント
pub fn event(action: SponsorshipAction, tier_id: &str) -> SponsorshipEvent {
    SponsorshipEvent {
        action,
        sponsor: sponsor(),
        tier: SponsorshipTier {
            opaque_id: tier_id.to_string(),
            monthly_price_cents: 500,
            name: "$5 a month".to_string(),
        },
        sender: sponsor(),
    }
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        discord_token: "bot-token".to_string(),
        webhook_secret: "secret".to_string(),
        log_channel_id: "900".to_string(),
        guild_id: "800".to_string(),
        role_mapping: RoleMapping::default(),
        github_token: None,
        github_api_url: "http://github.invalid".to_string(),
        discord_api_url: "http://discord.invalid".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// インメモリの `GithubApi` 実装。ページ要求を記録する。
#[derive(Default)]
pub struct MockGithub {
    gists: HashMap<String, Vec<Gist>>,
    raw: HashMap<String, String>,
    fail_raw: bool,
    requests: Mutex<Vec<(String, u32)>>,
}

impl MockGithub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gists(mut self, handle: &str, gists: Vec<Gist>) -> Self {
        self.gists.insert(handle.to_string(), gists);
        self
    }

    pub fn with_raw(mut self, url: &str, content: &str) -> Self {
        self.raw.insert(url.to_string(), content.to_string());
        self
    }

    /// ファイル取得を常に通信エラーにする
    pub fn failing_raw_fetch(mut self) -> Self {
        self.fail_raw = true;
        self
    }

    /// `handle` について要求されたページ番号の一覧
    pub fn pages_requested(&self, handle: &str) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, page)| *page)
            .collect()
    }
}

#[async_trait::async_trait]
impl GithubApi for MockGithub {
    async fn list_gists_page(
        &self,
        handle: &str,
        page: u32,
        per_page: usize,
    ) -> Result<Vec<Gist>, GatewayError> {
        self.requests
            .lock()
            .unwrap()
            .push((handle.to_string(), page));
        let all = self.gists.get(handle).cloned().unwrap_or_default();
        let start = (page as usize - 1) * per_page;
        Ok(all.into_iter().skip(start).take(per_page).collect())
    }

    async fn fetch_raw(&self, url: &str) -> Result<String, GatewayError> {
        if self.fail_raw {
            return Err(GatewayError::Upstream(format!("connection reset ({url})")));
        }
        self.raw
            .get(url)
            .cloned()
            .ok_or_else(|| GatewayError::Upstream(format!("HTTP 404 ({url})")))
    }
}

// ---------------------------------------------------------------------------
// Discord
// ---------------------------------------------------------------------------

/// インメモリの `DiscordApi` 実装。
///
/// `history` は新しい順に並べる（Discordの履歴取得と同じ順序）。
#[derive(Default)]
pub struct MockDiscord {
    users: HashMap<String, DiscordUser>,
    members: Mutex<HashMap<String, Vec<String>>>,
    history: Vec<Message>,
    reject: Option<(u16, serde_json::Value)>,
    patches: Mutex<Vec<(String, Vec<String>)>>,
    posted: Mutex<Vec<(String, CreateMessage)>>,
    member_lookups: AtomicUsize,
    history_requests: AtomicUsize,
}

impl MockDiscord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, username: &str) -> Self {
        self.users.insert(
            id.to_string(),
            DiscordUser {
                id: id.to_string(),
                username: username.to_string(),
            },
        );
        self
    }

    pub fn with_member(mut self, id: &str, role_ids: &[&str]) -> Self {
        self.members
            .get_mut()
            .unwrap()
            .insert(id.to_string(), roles(role_ids));
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// ロール更新を常に拒否する
    pub fn rejecting_patches(mut self, status: u16, body: serde_json::Value) -> Self {
        self.reject = Some((status, body));
        self
    }

    pub fn member_roles(&self, id: &str) -> Option<Vec<String>> {
        self.members.lock().unwrap().get(id).cloned()
    }

    /// 送られたロール更新（ユーザーID, 置換後ロール）
    pub fn patches(&self) -> Vec<(String, Vec<String>)> {
        self.patches.lock().unwrap().clone()
    }

    /// 投稿されたメッセージ（チャンネルID, 本文）
    pub fn posted(&self) -> Vec<(String, CreateMessage)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn member_lookups(&self) -> usize {
        self.member_lookups.load(Ordering::SeqCst)
    }

    pub fn history_requests(&self) -> usize {
        self.history_requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DiscordApi for MockDiscord {
    async fn get_user(&self, user_id: &str) -> Result<Option<DiscordUser>, GatewayError> {
        Ok(self.users.get(user_id).cloned())
    }

    async fn get_member(
        &self,
        _guild_id: &str,
        user_id: &str,
    ) -> Result<Option<GuildMember>, GatewayError> {
        self.member_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(user_id)
            .map(|roles| GuildMember {
                user: self.users.get(user_id).cloned(),
                roles: roles.clone(),
            }))
    }

    async fn modify_member_roles(
        &self,
        _guild_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<RoleUpdate, GatewayError> {
        self.patches
            .lock()
            .unwrap()
            .push((user_id.to_string(), roles.to_vec()));
        if let Some((status, body)) = &self.reject {
            return Ok(RoleUpdate::Rejected {
                status: *status,
                body: body.clone(),
            });
        }
        self.members
            .lock()
            .unwrap()
            .insert(user_id.to_string(), roles.to_vec());
        Ok(RoleUpdate::Updated(GuildMember {
            user: self.users.get(user_id).cloned(),
            roles: roles.to_vec(),
        }))
    }

    async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError> {
        let mut posted = self.posted.lock().unwrap();
        posted.push((channel_id.to_string(), message.clone()));
        Ok(Message {
            id: format!("posted-{}", posted.len()),
            content: message.content.clone(),
            mentions: Vec::new(),
        })
    }

    async fn channel_messages(
        &self,
        _channel_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>, GatewayError> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);
        let start = match before {
            Some(id) => match self.history.iter().position(|m| m.id == id) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(self.history.iter().skip(start).take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// 監査ログ
// ---------------------------------------------------------------------------

/// 投稿を同期的に記録する `AuditSink` 実装。
#[derive(Default)]
pub struct RecordingAuditSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingAuditSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn post(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}
