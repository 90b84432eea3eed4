//! 帶簽章的 ACME 請求。
//!
//! 每個需驗證身分的 CA 呼叫都經由 [`AcmeClient::signed_request`]：取得 nonce、
//! 組出受保護標頭、交由 [`Signer`] 簽章後 POST。CA 回報 `badNonce` 時換一個
//! nonce 重送，最多重試 [`MAX_BAD_NONCE_RETRIES`] 次。

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    directory::Directory,
    jws::{Jws, JwsError},
    nonce::{NonceError, NonceManager},
    payload::Payload,
    protection::{KeyId, ProtectedHeader},
    signature::Signer,
    transport::{HttpResponse, Transport, TransportError},
};

/// `badNonce` 最多重試次數；第 101 次仍失敗即放棄。
pub const MAX_BAD_NONCE_RETRIES: usize = 100;

/// CA 表示 nonce 無效的錯誤類型。
pub const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";

/// 發送 CA 請求時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Nonce error: {0}")]
    Nonce(#[from] NonceError),
    #[error("JWS error: {0}")]
    Jws(#[from] JwsError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// 除 `badNonce` 以外的任何非 2xx 回應。
    #[error("CA returned {status} for {url} (payload: {payload:?}): {body}")]
    CaProtocol {
        url: String,
        payload: Option<String>,
        status: u16,
        body: Value,
    },
    #[error("Gave up on {url} after {attempts} bad nonce responses")]
    NonceExhausted { url: String, attempts: usize },
}

impl RequestError {
    /// CA 回傳的 problem `type`，若有的話。
    pub fn problem_type(&self) -> Option<&str> {
        match self {
            RequestError::CaProtocol { body, .. } => body.get("type").and_then(Value::as_str),
            _ => None,
        }
    }
}

type Result<T> = std::result::Result<T, RequestError>;

/// 對 CA 發送請求的客戶端，持有傳輸層、簽章器與 nonce 狀態。
#[derive(Debug)]
pub struct AcmeClient<T, S> {
    transport: T,
    signer: S,
    nonces: NonceManager,
}

impl<T: Transport, S: Signer> AcmeClient<T, S> {
    pub fn new(transport: T, signer: S, directory: &Directory) -> Self {
        Self {
            transport,
            signer,
            nonces: NonceManager::new(&directory.new_nonce),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 送出簽章請求，回傳 2xx 的回應。
    ///
    /// # 錯誤
    ///
    /// - 非 2xx 且不是 `badNonce`：[`RequestError::CaProtocol`]
    /// - 連續 `badNonce` 超過上限：[`RequestError::NonceExhausted`]
    pub fn signed_request<P: Payload + ?Sized>(
        &mut self,
        url: &str,
        payload: &P,
        key_id: KeyId<'_>,
    ) -> Result<HttpResponse> {
        let payload_b64 = payload.to_base64()?;
        let mut bad_nonces = 0;

        loop {
            let nonce = self.nonces.next(&self.transport)?;
            debug!(url, nonce = %nonce, attempt = bad_nonces + 1, "sending signed request");

            let header = ProtectedHeader::new(url, nonce, key_id);
            let jws = Jws::sign(&header, &payload_b64, &self.signer)?;
            let response = self.transport.post_jose(url, jws.to_json()?)?;
            self.nonces.harvest(&response.headers);

            if response.status.is_success() {
                return Ok(response);
            }

            let body = problem_body(&response);
            if response.status.as_u16() == 400 && is_bad_nonce(&body) {
                if bad_nonces >= MAX_BAD_NONCE_RETRIES {
                    return Err(RequestError::NonceExhausted {
                        url: url.to_string(),
                        attempts: bad_nonces + 1,
                    });
                }
                bad_nonces += 1;
                warn!(url, retry = bad_nonces, "CA rejected nonce, retrying");
                continue;
            }

            return Err(RequestError::CaProtocol {
                url: url.to_string(),
                payload: serde_json::to_string(payload).ok(),
                status: response.status.as_u16(),
                body,
            });
        }
    }

    /// 對 CA 資源發送不帶簽章的 GET。
    pub fn get(&mut self, url: &str) -> Result<HttpResponse> {
        let response = self.transport.get(url)?;
        self.nonces.harvest(&response.headers);

        if !response.status.is_success() {
            return Err(RequestError::CaProtocol {
                url: url.to_string(),
                payload: None,
                status: response.status.as_u16(),
                body: problem_body(&response),
            });
        }
        Ok(response)
    }
}

/// 盡量把回應解析為 JSON，失敗則保留原始文字。
fn problem_body(response: &HttpResponse) -> Value {
    response
        .json::<Value>()
        .unwrap_or_else(|_| Value::String(response.text()))
}

fn is_bad_nonce(body: &Value) -> bool {
    body.get("type").and_then(Value::as_str) == Some(BAD_NONCE)
}
