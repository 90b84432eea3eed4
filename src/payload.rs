use serde::{Deserialize, Serialize};

use crate::base64::Base64;

/// 所有簽章請求載荷（Payload）共用的行為。
pub trait Payload: Serialize {
    /// 序列化為 JSON 後以 base64url 編碼。
    fn to_base64(&self) -> Result<Base64, serde_json::Error> {
        Ok(Base64::new(serde_json::to_vec(self)?))
    }
}

impl Payload for serde_json::Value {}

/// `newAccount` 請求的載荷，只表示同意服務條款。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountPayload {
    #[serde(rename = "termsOfServiceAgreed")]
    pub terms_of_service_agreed: bool,
}

impl NewAccountPayload {
    pub fn new() -> Self {
        Self {
            terms_of_service_agreed: true,
        }
    }
}

impl Default for NewAccountPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl Payload for NewAccountPayload {}

/// 更新帳戶聯絡資訊的載荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContactPayload {
    pub contact: Vec<String>,
}

impl UpdateContactPayload {
    /// 未帶 URI scheme 的聯絡資訊會自動補上 `mailto:` 前綴。
    pub fn new<I, S>(contacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let contact = contacts
            .into_iter()
            .map(|c| {
                let c = c.as_ref().trim();
                if c.contains(':') {
                    c.to_string()
                } else {
                    format!("mailto:{}", c)
                }
            })
            .collect();

        Self { contact }
    }
}

impl Payload for UpdateContactPayload {}

/// 訂單中的識別項（目前只使用 `dns`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            type_: "dns".to_string(),
            value: value.into(),
        }
    }
}

/// `newOrder` 請求的載荷。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderPayload {
    pub identifiers: Vec<Identifier>,
}

impl NewOrderPayload {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: domains.into_iter().map(Identifier::dns).collect(),
        }
    }
}

impl Payload for NewOrderPayload {}

/// 通知 CA 挑戰已就緒的空載荷 `{}`。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeReadyPayload {}

impl Payload for ChallengeReadyPayload {}

/// 最終確認訂單的載荷，內含 DER 格式 CSR 的 base64url。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOrderPayload {
    pub csr: String,
}

impl FinalizeOrderPayload {
    pub fn new(csr_der: &[u8]) -> Self {
        Self {
            csr: Base64::new(csr_der).base64_url(),
        }
    }
}

impl Payload for FinalizeOrderPayload {}
