//! 授權（Authorization）與 HTTP-01 挑戰。

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{jwk::Thumbprint, payload::Identifier, poll::Pollable, transport::Transport};

/// 處理挑戰時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("Failed to write challenge file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// 本機自我檢查失敗；挑戰檔案已被移除。
    #[error("Wrote file to {path}, but couldn't download {url}: {reason}")]
    ValidationFailed {
        path: PathBuf,
        url: String,
        reason: String,
    },
    #[error("No http-01 challenge offered for {domain} (offered: {offered:?})")]
    UnsupportedType { domain: String, offered: Vec<String> },
}

type Result<T> = std::result::Result<T, ChallengeError>;

/// 挑戰狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// 授權狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// 各類挑戰共有的欄位。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeData {
    pub url: String,
    #[serde(default)]
    pub token: String,
    pub status: ChallengeStatus,
}

/// CA 提供的一種驗證方式，依 `type` 欄位區分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Challenge {
    #[serde(rename = "http-01")]
    Http01(ChallengeData),
    /// 不支援，僅供辨識。
    #[serde(rename = "dns-01")]
    Dns01(ChallengeData),
    /// 不支援，僅供辨識。
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01(ChallengeData),
    #[serde(other)]
    Unknown,
}

impl Challenge {
    pub fn kind(&self) -> &'static str {
        match self {
            Challenge::Http01(_) => "http-01",
            Challenge::Dns01(_) => "dns-01",
            Challenge::TlsAlpn01(_) => "tls-alpn-01",
            Challenge::Unknown => "unknown",
        }
    }
}

/// 單一網域的授權資源。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default)]
    pub wildcard: bool,
}

impl Authorization {
    pub fn domain(&self) -> &str {
        &self.identifier.value
    }

    /// 選出 `http-01` 挑戰。
    ///
    /// # 錯誤
    ///
    /// CA 沒有提供 `http-01` 時回傳 [`ChallengeError::UnsupportedType`]。
    pub fn http01(&self) -> Result<&ChallengeData> {
        self.challenges
            .iter()
            .find_map(|c| match c {
                Challenge::Http01(data) => Some(data),
                _ => None,
            })
            .ok_or_else(|| ChallengeError::UnsupportedType {
                domain: self.domain().to_string(),
                offered: self.challenges.iter().map(|c| c.kind().to_string()).collect(),
            })
    }
}

impl Pollable for Authorization {
    type Status = AuthorizationStatus;

    fn status(&self) -> &AuthorizationStatus {
        &self.status
    }
}

/// 把 token 中 `[A-Za-z0-9_-]` 以外的字元換成 `_`，使其可安全作為檔名。
pub fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `token.thumbprint`，token 先經過 [`sanitize_token`]。
pub fn key_authorization(token: &str, thumbprint: &Thumbprint) -> String {
    format!("{}.{}", sanitize_token(token), thumbprint)
}

/// 本機 HTTP-01 挑戰回應者：把 key authorization 寫入網站伺服器公開的目錄。
#[derive(Debug, Clone)]
pub struct ChallengeResponder {
    check_dir: PathBuf,
    disable_local_check: bool,
}

impl ChallengeResponder {
    pub fn new(check_dir: impl Into<PathBuf>) -> Self {
        Self {
            check_dir: check_dir.into(),
            disable_local_check: false,
        }
    }

    /// 略過寫檔後的本機 HTTP 自我檢查，適用於本機無法連回自身網域的環境。
    pub fn disable_local_check(mut self, disable: bool) -> Self {
        self.disable_local_check = disable;
        self
    }

    pub fn check_dir(&self) -> &Path {
        &self.check_dir
    }

    pub fn well_known_url(domain: &str, token: &str) -> String {
        format!(
            "http://{}/.well-known/acme-challenge/{}",
            domain,
            sanitize_token(token)
        )
    }

    /// 發布挑戰檔案並（預設）自我檢查，成功時回傳檔案路徑。
    ///
    /// 檔案內容恰為 key authorization，不含換行。自我檢查以 GET 取得
    /// `http://<domain>/.well-known/acme-challenge/<token>`，回應必須為 2xx
    /// 且本文完全相同。
    ///
    /// # 錯誤
    ///
    /// - 寫檔失敗：[`ChallengeError::Io`]
    /// - 自我檢查失敗：[`ChallengeError::ValidationFailed`]，此時檔案已被刪除
    pub fn respond<T: Transport>(
        &self,
        transport: &T,
        domain: &str,
        challenge: &ChallengeData,
        thumbprint: &Thumbprint,
    ) -> Result<PathBuf> {
        let token = sanitize_token(&challenge.token);
        let key_auth = key_authorization(&challenge.token, thumbprint);
        let path = self.check_dir.join(&token);

        fs::write(&path, key_auth.as_bytes()).map_err(|source| ChallengeError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(domain, path = %path.display(), "challenge file written");

        if self.disable_local_check {
            return Ok(path);
        }

        let url = Self::well_known_url(domain, &token);
        let failure = match transport.get(&url) {
            Ok(response) if !response.status.is_success() => {
                Some(format!("HTTP status {}", response.status))
            }
            Ok(response) if response.body != key_auth.as_bytes() => Some(format!(
                "expected {:?}, got {:?}",
                key_auth,
                response.text()
            )),
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        };

        match failure {
            None => {
                info!(domain, url = %url, "challenge file reachable");
                Ok(path)
            }
            Some(reason) => {
                self.cleanup(&path);
                Err(ChallengeError::ValidationFailed { path, url, reason })
            }
        }
    }

    /// 刪除挑戰檔案；失敗只記錄警告。
    pub fn cleanup(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "challenge file removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove challenge file"),
        }
    }
}
