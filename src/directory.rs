use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::transport::{Transport, TransportError};

/// 取得目錄時可能發生的錯誤類型。
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// 無法連線到 CA。
    #[error("Directory request failed: {0}")]
    Request(#[from] TransportError),
    /// CA 回應非 2xx。
    #[error("Directory request to {url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    /// 回應內容不是預期的操作名稱對 URL 映射。
    #[error("Malformed directory: {0}")]
    Json(#[from] serde_json::Error),
}

type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// CA 的服務目錄：操作名稱對應的 URL。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Directory {
    /// 用於新帳號註冊的 API 路徑。
    #[serde(rename = "newAccount")]
    pub new_account: String,
    /// 用於取得新的 nonce 值的 API 路徑。
    #[serde(rename = "newNonce")]
    pub new_nonce: String,
    /// 用於建立訂單的 API 路徑。
    #[serde(rename = "newOrder")]
    pub new_order: String,
    /// 用於撤銷憑證的 API 路徑。
    #[serde(rename = "revokeCert")]
    pub revoke_cert: String,
    /// 用於更換帳戶金鑰的 API 路徑。
    #[serde(rename = "keyChange")]
    pub key_change: String,
    /// 用於取得續期資訊的 API 路徑，可能不存在。
    #[serde(rename = "renewalInfo", default, skip_serializing_if = "Option::is_none")]
    pub renewal_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// 目錄的 `meta` 欄位。
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DirectoryMeta {
    #[serde(rename = "termsOfService", default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl Directory {
    /// 從 CA 取得目錄，每個工作階段只呼叫一次，不重試。
    ///
    /// # 錯誤
    ///
    /// 連線失敗、非 2xx 回應或內容無法解析時回傳 [`DirectoryError`]。
    pub fn fetch<T: Transport>(transport: &T, url: &str) -> DirectoryResult<Self> {
        debug!(url, "fetching ACME directory");
        let response = transport.get(url)?;

        if !response.status.is_success() {
            return Err(DirectoryError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        let directory: Directory = serde_json::from_slice(&response.body)?;
        info!(url, "ACME directory ready");
        Ok(directory)
    }
}
