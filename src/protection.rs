use serde::{Deserialize, Serialize};

use crate::{base64::Base64, jwk::Jwk, nonce::Nonce};

/// 唯一支援的簽章演算法。
pub const ALG_RS256: &str = "RS256";

/// 受保護標頭用來識別簽章金鑰的方式。
///
/// 帳戶註冊前以 `jwk` 內嵌公鑰，註冊後改以帳戶 URL 作為 `kid`。
#[derive(Debug, Clone, Copy)]
pub enum KeyId<'a> {
    Jwk(&'a Jwk),
    Kid(&'a str),
}

/// JWS 的受保護標頭（Protected Header）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    /// 請求目標 URL
    pub url: String,
    /// 簽章演算法
    pub alg: String,
    /// 用於防止重放攻擊的隨機數
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl ProtectedHeader {
    /// 建立標頭；傳入的 nonce 在此被消耗。
    pub fn new(url: &str, nonce: Nonce, key_id: KeyId<'_>) -> Self {
        let (jwk, kid) = match key_id {
            KeyId::Jwk(jwk) => (Some(jwk.clone()), None),
            KeyId::Kid(kid) => (None, Some(kid.to_string())),
        };

        Self {
            url: url.to_string(),
            alg: ALG_RS256.to_string(),
            nonce: nonce.into_inner(),
            jwk,
            kid,
        }
    }

    /// 序列化後轉為 base64url。
    pub fn to_base64(&self) -> Result<Base64, serde_json::Error> {
        Ok(Base64::new(serde_json::to_vec(self)?))
    }
}
