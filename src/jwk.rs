use std::fmt;

use openssl::{
    bn::BigNumRef,
    pkey::{HasPublic, Id, PKeyRef},
    sha::sha256,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::base64::Base64;

/// JWK 產生與序列化過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum JwkError {
    #[error("Unsupported key type: {0:?}")]
    UnsupportedAlgorithm(Id),
    #[error("Failed to convert key: {0}")]
    KeyConversion(#[from] openssl::error::ErrorStack),
    #[error("Invalid hex component: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, JwkError>;

/// RSA 公鑰的 JSON Web Key 表示。
///
/// 欄位依字母順序宣告，序列化結果即為 thumbprint 所需的標準形式
/// （鍵值排序、無空白）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    e: String,
    kty: String,
    n: String,
}

/// JWK 的 SHA-256 thumbprint（base64url）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Thumbprint(String);

impl Thumbprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Thumbprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Jwk {
    /// 由任一含公鑰的 RSA 金鑰建立 JWK。
    ///
    /// 模數與指數先轉為十六進位字串；若長度為奇數則左補一個 `0`，
    /// 再解碼為位元組並以 base64url 編碼，確保相同金鑰永遠得到相同結果。
    pub fn from_key<T: HasPublic>(key: &PKeyRef<T>) -> Result<Self> {
        if key.id() != Id::RSA {
            return Err(JwkError::UnsupportedAlgorithm(key.id()));
        }
        let rsa = key.rsa()?;

        Ok(Self {
            e: encode_component(rsa.e())?,
            kty: "RSA".to_string(),
            n: encode_component(rsa.n())?,
        })
    }

    /// 標準形式的 JSON 字串。
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn thumbprint(&self) -> Result<Thumbprint> {
        let digest = sha256(self.to_canonical_json()?.as_bytes());
        Ok(Thumbprint(Base64::new(digest).base64_url()))
    }

    pub fn n(&self) -> &str {
        &self.n
    }

    pub fn e(&self) -> &str {
        &self.e
    }
}

fn encode_component(value: &BigNumRef) -> Result<String> {
    let hex_str = value.to_hex_str()?;
    let bytes = hex::decode(even_hex(&hex_str))?;
    Ok(Base64::new(bytes).base64_url())
}

/// 奇數長度的十六進位字串左補一個零。
fn even_hex(hex_str: &str) -> String {
    if hex_str.len() % 2 == 1 {
        format!("0{}", hex_str)
    } else {
        hex_str.to_string()
    }
}
