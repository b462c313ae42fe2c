//! # メタデータ取得
//!
//! スポンサーが公開しているGistのうち、説明文が `sponsor roles metadata`（大文字小文字不問）
//! のものから `ME.txt` を取り出し、本文からDiscord IDを抽出する。
//! 取得結果はキャッシュしない（イベントごとに取り直す）。

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sponsor_types::LinkedIdentity;

use crate::error::GatewayError;
use crate::github::GithubApi;
use crate::pagination::collect_gists;

/// メタデータGistの説明文（小文字で比較）
pub const METADATA_DESCRIPTION: &str = "sponsor roles metadata";
/// メタデータファイル名
pub const METADATA_FILENAME: &str = "ME.txt";

/// Discord IDを含む行。`123`, `discord: 123`, `Discord ID = <@!123>` 等を受け付ける。
static METADATA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:discord(?:[ \t]*id)?[ \t]*[:=][ \t]*)?<?@?!?(?P<id>\d+)>?[ \t]*\r?$")
        .expect("invalid metadata pattern")
});

/// メタデータ取得の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    Found(LinkedIdentity),
    /// 該当する説明文のGistがない
    NoEntry,
    /// Gistはあるが `ME.txt` がない
    NoFile,
    /// `ME.txt` の内容からIDを抽出できない
    Malformed,
}

/// ファイル本文からDiscord IDを抽出する。最初に一致した行を使う。
pub fn extract_identity(content: &str) -> Option<LinkedIdentity> {
    METADATA_PATTERN
        .captures(content)
        .and_then(|caps| caps.name("id"))
        .map(|id| LinkedIdentity {
            internal_id: id.as_str().to_string(),
        })
}

/// スポンサーのメタデータファイルを取得する。
pub struct MetadataFetcher {
    github: Arc<dyn GithubApi>,
}

impl MetadataFetcher {
    pub fn new(github: Arc<dyn GithubApi>) -> Self {
        Self { github }
    }

    /// `handle` のメタデータファイルからリンク先IDを解決する。
    pub async fn resolve_linked_identity(
        &self,
        handle: &str,
    ) -> Result<MetadataOutcome, GatewayError> {
        let gists = collect_gists(self.github.as_ref(), handle).await?;

        let Some(entry) = gists.iter().find(|g| {
            g.description
                .as_deref()
                .is_some_and(|d| d.to_lowercase() == METADATA_DESCRIPTION)
        }) else {
            return Ok(MetadataOutcome::NoEntry);
        };

        let Some(file) = entry.files.get(METADATA_FILENAME) else {
            return Ok(MetadataOutcome::NoFile);
        };

        let content = self.github.fetch_raw(&file.raw_url).await?;
        Ok(match extract_identity(&content) {
            Some(identity) => MetadataOutcome::Found(identity),
            None => MetadataOutcome::Malformed,
        })
    }
}
