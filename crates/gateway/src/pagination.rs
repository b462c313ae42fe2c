//! # ページング取得
//!
//! GitHub Gist一覧とDiscord監査チャンネル履歴のページ送り。
//! どちらも1ページ100件で取得し、100件未満のページが返った時点で終端とみなす。

use sponsor_types::{Gist, Message};

use crate::discord::DiscordApi;
use crate::error::GatewayError;
use crate::github::GithubApi;

/// 1ページあたりの取得件数
pub const PAGE_SIZE: usize = 100;

/// `handle` の全Gistを取得する。ページ順に連結し、重複や欠落はない。
pub async fn collect_gists(
    github: &dyn GithubApi,
    handle: &str,
) -> Result<Vec<Gist>, GatewayError> {
    let mut gists = Vec::new();
    let mut page = 1;
    loop {
        let batch = github.list_gists_page(handle, page, PAGE_SIZE).await?;
        let is_last = batch.len() < PAGE_SIZE;
        gists.extend(batch);
        if is_last {
            break;
        }
        page += 1;
    }
    tracing::debug!(handle, pages = page, count = gists.len(), "Gist一覧を取得");
    Ok(gists)
}

/// 監査チャンネル履歴のカーソル。
///
/// 新しいメッセージから古い方向へ1ページずつ遅延取得する。
/// 途中から再開する手段はなく、やり直す場合は新しいカーソルを作る（常に最新ページから）。
pub struct AuditHistory<'a> {
    discord: &'a dyn DiscordApi,
    channel_id: &'a str,
    /// 次ページの起点（前ページの最も古いメッセージID）
    before: Option<String>,
    exhausted: bool,
}

impl<'a> AuditHistory<'a> {
    pub fn new(discord: &'a dyn DiscordApi, channel_id: &'a str) -> Self {
        Self {
            discord,
            channel_id,
            before: None,
            exhausted: false,
        }
    }

    /// 次のページを取得する。終端に達していれば `None`。
    pub async fn next_page(&mut self) -> Result<Option<Vec<Message>>, GatewayError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .discord
            .channel_messages(self.channel_id, self.before.as_deref(), PAGE_SIZE)
            .await?;
        if page.len() < PAGE_SIZE {
            self.exhausted = true;
        }
        if page.is_empty() {
            return Ok(None);
        }

        self.before = page.last().map(|m| m.id.clone());
        Ok(Some(page))
    }

    /// 条件に一致する最も新しいメッセージを探す。見つかった時点で取得を打ち切る。
    pub async fn find<P>(mut self, mut predicate: P) -> Result<Option<Message>, GatewayError>
    where
        P: FnMut(&Message) -> bool,
    {
        while let Some(page) = self.next_page().await? {
            if let Some(hit) = page.into_iter().find(|m| predicate(m)) {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}
