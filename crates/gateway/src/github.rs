//! # GitHub APIクライアント
//!
//! スポンサーのGist一覧（ページ単位）とGistファイル本文の取得を抽象化する。

use reqwest::StatusCode;
use sponsor_types::Gist;

use crate::error::GatewayError;

/// GitHub APIへのアクセスを抽象化するトレイト。
#[async_trait::async_trait]
pub trait GithubApi: Send + Sync {
    /// `handle` の公開Gistを1ページ分取得する（`page` は1始まり）。
    ///
    /// アカウントが存在しない場合は空ページを返す。
    async fn list_gists_page(
        &self,
        handle: &str,
        page: u32,
        per_page: usize,
    ) -> Result<Vec<Gist>, GatewayError>;

    /// Gistファイルの生データをテキストとして取得する。
    async fn fetch_raw(&self, url: &str) -> Result<String, GatewayError>;
}

/// reqwestによる `GithubApi` 実装。
pub struct GithubClient {
    http_client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    /// # 引数
    /// - `api_url`: APIのベースURL（例: "https://api.github.com"）
    /// - `token`: 認証トークン。未指定なら匿名アクセス
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("sponsor-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Internal(format!("HTTPクライアントの構築に失敗: {e}")))?;
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl GithubApi for GithubClient {
    async fn list_gists_page(
        &self,
        handle: &str,
        page: u32,
        per_page: usize,
    ) -> Result<Vec<Gist>, GatewayError> {
        let url = format!("{}/users/{handle}/gists", self.api_url);
        let response = self
            .get(&url)
            .query(&[("per_page", per_page.to_string()), ("page", page.to_string())])
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Gist一覧の取得に失敗 ({url}): {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(handle, "GitHubアカウントが見つかりません");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "GitHubがエラーを返しました: HTTP {status} - {body}"
            )));
        }

        response
            .json::<Vec<Gist>>()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Gist一覧のパースに失敗: {e}")))
    }

    async fn fetch_raw(&self, url: &str) -> Result<String, GatewayError> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("ファイル取得に失敗 ({url}): {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "ファイル取得でHTTPエラー: ステータス {status} ({url})"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| GatewayError::Upstream(format!("レスポンス読み取り失敗: {e}")))
    }
}
