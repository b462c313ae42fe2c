//! # Sponsor Roles 署名検証
//!
//! GitHub Webhookの `X-Hub-Signature-256` ヘッダを検証する。
//!
//! ## 署名形式
//! | 項目 | 値 |
//! |------|----|
//! | アルゴリズム | HMAC-SHA256 |
//! | 鍵 | Webhook共有シークレット |
//! | 対象 | 受信したリクエストボディ（生バイト列） |
//! | ヘッダ形式 | `sha256=<小文字hex>` |

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 署名ヘッダのアルゴリズムプレフィックス
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256ダイジェストのバイト長
const DIGEST_LEN: usize = 32;

/// 署名処理のエラー型
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    /// `sha256=` プレフィックスがない
    #[error("署名ヘッダに sha256= プレフィックスがありません")]
    MissingPrefix,
    /// HMAC鍵として使えない
    #[error("HMAC鍵の初期化に失敗しました")]
    InvalidKey,
    /// hexとして解釈できない
    #[error("署名のhexデコードに失敗しました")]
    InvalidHex,
    /// ダイジェスト長が一致しない
    #[error("署名の長さが不正です: {0}バイト")]
    InvalidLength(usize),
    /// ダイジェストが一致しない
    #[error("署名が一致しません")]
    Mismatch,
}

/// ボディに対する署名ヘッダ値（`sha256=<hex>`）を計算する。
pub fn sign_body(raw_body: &[u8], secret: &[u8]) -> Result<String, SignatureError> {
    let mut mac = mac_for(secret)?;
    mac.update(raw_body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// 署名ヘッダを検証し、失敗理由を返す。
///
/// ダイジェストの比較は `Mac::verify_slice`（定数時間比較）で行う。
pub fn check_signature(
    raw_body: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let hex_digest = signature_header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::MissingPrefix)?;
    let expected = hex::decode(hex_digest).map_err(|_| SignatureError::InvalidHex)?;
    if expected.len() != DIGEST_LEN {
        return Err(SignatureError::InvalidLength(expected.len()));
    }

    let mut mac = mac_for(secret)?;
    mac.update(raw_body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// 署名ヘッダがボディと一致するかを返す。
///
/// 長さ不一致・内容不一致・形式不正はいずれも `false`（パニックやエラーにはしない）。
pub fn verify(raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    check_signature(raw_body, signature_header, secret).is_ok()
}

fn mac_for(secret: &[u8]) -> Result<HmacSha256, SignatureError> {
    <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)
}
