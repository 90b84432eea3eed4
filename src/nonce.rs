use std::fmt;

use reqwest::header::HeaderMap;
use thiserror::Error;
use tracing::debug;

use crate::transport::{Transport, TransportError};

/// CA 回應中攜帶 nonce 的標頭名稱。
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// 在取得 Nonce 時可能發生的錯誤狀況。
#[derive(Error, Debug)]
pub enum NonceError {
    #[error("Failed to make request: {0}")]
    Request(#[from] TransportError),
    #[error("No Replay-Nonce header found in response from {0}")]
    NoNonceHeader(String),
}

/// 一次性的防重放值。
///
/// 不實作 `Clone`：取得後只能被嵌入一個已簽章的請求。
#[derive(Debug, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 追蹤 CA 發出的 nonce。
///
/// 只保留「最近一次收到、尚未使用」的值；沒有可用值時向 `newNonce` 發送 HEAD 請求。
#[derive(Debug)]
pub struct NonceManager {
    new_nonce_url: String,
    pending: Option<String>,
}

impl NonceManager {
    pub fn new(new_nonce_url: impl Into<String>) -> Self {
        Self {
            new_nonce_url: new_nonce_url.into(),
            pending: None,
        }
    }

    /// 從任一 CA 回應的標頭收集 `Replay-Nonce`，覆蓋先前未使用的值。
    pub fn harvest(&mut self, headers: &HeaderMap) {
        if let Some(value) = headers.get(REPLAY_NONCE).and_then(|v| v.to_str().ok()) {
            if !value.is_empty() {
                self.pending = Some(value.to_string());
            }
        }
    }

    /// 取出下一個 nonce；快取值被取出後即失效。
    ///
    /// # 錯誤
    ///
    /// 向 `newNonce` 請求失敗或回應缺少 `Replay-Nonce` 時回傳 [`NonceError`]。
    pub fn next<T: Transport>(&mut self, transport: &T) -> Result<Nonce, NonceError> {
        if let Some(nonce) = self.pending.take() {
            return Ok(Nonce::new(nonce));
        }

        debug!(url = %self.new_nonce_url, "requesting fresh nonce");
        let response = transport.head(&self.new_nonce_url)?;
        response
            .header(REPLAY_NONCE)
            .filter(|v| !v.is_empty())
            .map(Nonce::new)
            .ok_or_else(|| NonceError::NoNonceHeader(self.new_nonce_url.clone()))
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
