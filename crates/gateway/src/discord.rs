//! # Discord APIクライアント
//!
//! ユーザー照会、ギルドメンバー照会、ロール置換、監査チャンネルへの投稿と履歴取得を抽象化する。
//! いずれもBotトークン（`Authorization: Bot <token>`）で認証する。

use reqwest::StatusCode;
use sponsor_types::{CreateMessage, DiscordUser, GuildMember, Message, ModifyMemberRoles};

use crate::error::GatewayError;

/// ロール置換（PATCH）の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum RoleUpdate {
    /// 更新後のメンバー情報
    Updated(GuildMember),
    /// Discordが更新を拒否した。エラーボディをそのまま保持する。
    Rejected {
        status: u16,
        body: serde_json::Value,
    },
}

/// Discord REST APIへのアクセスを抽象化するトレイト。
#[async_trait::async_trait]
pub trait DiscordApi: Send + Sync {
    /// ユーザーを取得する。存在しなければ `None`。
    async fn get_user(&self, user_id: &str) -> Result<Option<DiscordUser>, GatewayError>;

    /// ギルドメンバー情報を取得する。メンバーでなければ `None`。
    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<GuildMember>, GatewayError>;

    /// メンバーのロール一覧を `roles` で置き換える。
    async fn modify_member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<RoleUpdate, GatewayError>;

    /// チャンネルにメッセージを投稿する。
    async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError>;

    /// チャンネルのメッセージを新しい順に最大 `limit` 件取得する。
    /// `before` を指定した場合はそのメッセージより古いものだけを返す。
    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>, GatewayError>;
}

/// Bot APIが要求する `DiscordBot (<url>, <version>)` 形式のUser-Agent
const USER_AGENT: &str = concat!(
    "DiscordBot (",
    env!("CARGO_PKG_REPOSITORY"),
    ", ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// reqwestによる `DiscordApi` 実装。
pub struct DiscordClient {
    http_client: reqwest::Client,
    api_url: String,
    token: String,
}

impl DiscordClient {
    /// # 引数
    /// - `api_url`: APIのベースURL（例: "https://discord.com/api/v10"）
    /// - `token`: Botトークン
    pub fn new(api_url: &str, token: String) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::Internal(format!("HTTPクライアントの構築に失敗: {e}")))?;
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{path}", self.api_url))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        request
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("Discord {what} の送信に失敗: {e}")))
    }
}

/// 失敗ステータスのレスポンスを通信エラーに変換する。
async fn upstream_error(response: reqwest::Response, what: &str) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Upstream(format!(
        "Discord {what} がエラーを返しました: HTTP {status} - {body}"
    ))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, GatewayError> {
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Upstream(format!("Discord {what} のパースに失敗: {e}")))
}

#[async_trait::async_trait]
impl DiscordApi for DiscordClient {
    async fn get_user(&self, user_id: &str) -> Result<Option<DiscordUser>, GatewayError> {
        let what = "ユーザー取得";
        let response = self
            .send(
                self.request(reqwest::Method::GET, &format!("/users/{user_id}")),
                what,
            )
            .await?;

        match response.status() {
            // 不正なSnowflakeは400、存在しないユーザーは404
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(None),
            s if s.is_success() => parse_json(response, what).await.map(Some),
            _ => Err(upstream_error(response, what).await),
        }
    }

    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<GuildMember>, GatewayError> {
        let what = "メンバー取得";
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/guilds/{guild_id}/members/{user_id}"),
                ),
                what,
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => parse_json(response, what).await.map(Some),
            _ => Err(upstream_error(response, what).await),
        }
    }

    async fn modify_member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<RoleUpdate, GatewayError> {
        let what = "ロール更新";
        let body = ModifyMemberRoles {
            roles: roles.to_vec(),
        };
        let response = self
            .send(
                self.request(
                    reqwest::Method::PATCH,
                    &format!("/guilds/{guild_id}/members/{user_id}"),
                )
                .json(&body),
                what,
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            return parse_json(response, what).await.map(RoleUpdate::Updated);
        }

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Upstream(format!("レスポンス読み取り失敗: {e}")))?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        Ok(RoleUpdate::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, GatewayError> {
        let what = "メッセージ投稿";
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/channels/{channel_id}/messages"),
                )
                .json(message),
                what,
            )
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, what).await);
        }
        parse_json(response, what).await
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>, GatewayError> {
        let what = "メッセージ履歴取得";
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/channels/{channel_id}/messages"),
                )
                .query(&query),
                what,
            )
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response, what).await);
        }
        parse_json(response, what).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::HeaderMap;
    use axum::Json;
    use std::collections::HashMap;

    use crate::test_helpers::serve;

    /// Botトークンで認証し、存在しないユーザーはNoneになることを確認
    #[tokio::test]
    async fn test_get_user() {
        let app = axum::Router::new().route(
            "/users/{id}",
            axum::routing::get(|Path(id): Path<String>, headers: HeaderMap| async move {
                assert_eq!(headers["authorization"], "Bot bot-token");
                if id == "123" {
                    Ok(Json(serde_json::json!({"id": "123", "username": "alice"})))
                } else {
                    Err(axum::http::StatusCode::NOT_FOUND)
                }
            }),
        );
        let port = serve(app).await;
        let client = DiscordClient::new(&format!("http://127.0.0.1:{port}"), "bot-token".into()).unwrap();

        let user = client.get_user("123").await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(client.get_user("999").await.unwrap().is_none());
    }

    /// ロール置換のPATCHボディと、拒否時のエラーボディ保持を確認
    #[tokio::test]
    async fn test_modify_member_roles() {
        let app = axum::Router::new().route(
            "/guilds/{guild}/members/{user}",
            axum::routing::patch(
                |Path((guild, user)): Path<(String, String)>,
                 Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(guild, "800");
                    if user == "123" {
                        Ok(Json(serde_json::json!({"roles": body["roles"].clone()})))
                    } else {
                        Err((
                            axum::http::StatusCode::FORBIDDEN,
                            Json(serde_json::json!({"message": "Missing Permissions", "code": 50013})),
                        ))
                    }
                },
            ),
        );
        let port = serve(app).await;
        let client = DiscordClient::new(&format!("http://127.0.0.1:{port}"), "t".into()).unwrap();

        let roles = vec!["A".to_string(), "B".to_string()];
        let updated = client.modify_member_roles("800", "123", &roles).await.unwrap();
        assert_eq!(
            updated,
            RoleUpdate::Updated(GuildMember {
                user: None,
                roles: roles.clone(),
            })
        );

        let rejected = client.modify_member_roles("800", "456", &roles).await.unwrap();
        match rejected {
            RoleUpdate::Rejected { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body["code"], 50013);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    /// 履歴取得でlimitとbeforeがクエリに載ることを確認
    #[tokio::test]
    async fn test_channel_messages_query() {
        let app = axum::Router::new().route(
            "/channels/{channel}/messages",
            axum::routing::get(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(query["limit"], "100");
                let before = query.get("before").cloned().unwrap_or_default();
                Json(serde_json::json!([
                    {"id": format!("before-{before}"), "content": "x", "mentions": []}
                ]))
            }),
        );
        let port = serve(app).await;
        let client = DiscordClient::new(&format!("http://127.0.0.1:{port}"), "t".into()).unwrap();

        let first = client.channel_messages("900", None, 100).await.unwrap();
        assert_eq!(first[0].id, "before-");
        let next = client.channel_messages("900", Some("42"), 100).await.unwrap();
        assert_eq!(next[0].id, "before-42");
    }

    /// すべての要求に `DiscordBot (...)` 形式のUser-Agentが付くことを確認
    #[tokio::test]
    async fn test_requests_carry_bot_user_agent() {
        let app = axum::Router::new().route(
            "/users/{id}",
            axum::routing::get(|headers: HeaderMap| async move {
                let agent = headers
                    .get(axum::http::header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(serde_json::json!({"id": "1", "username": agent}))
            }),
        );
        let port = serve(app).await;
        let client = DiscordClient::new(&format!("http://127.0.0.1:{port}"), "t".into()).unwrap();

        let user = client.get_user("1").await.unwrap().unwrap();
        assert!(user.username.starts_with("DiscordBot ("), "{}", user.username);
        assert!(user.username.contains(env!("CARGO_PKG_VERSION")));
    }
}
