//! 憑證申請設定。

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::ReqwestTransport;

/// Let's Encrypt 正式環境目錄。
pub const LETS_ENCRYPT: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt 測試環境目錄。
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// 設定無效時回傳的錯誤。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// 申請憑證所需的設定。
///
/// 除了 `check_dir` 必須由呼叫端提供之外，其餘欄位皆有預設值。
///
/// ```json
/// {
///     "directory_url": "https://acme-staging-v02.api.letsencrypt.org/directory",
///     "check_dir": "/var/www/.well-known/acme-challenge",
///     "contact": ["admin@example.com"],
///     "poll_timeout_secs": 600
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// CA 目錄 URL，預設為 Let's Encrypt 正式環境。
    pub directory_url: String,
    /// 網站伺服器對外公開為 `/.well-known/acme-challenge/` 的目錄，沒有預設值。
    pub check_dir: PathBuf,
    /// 帳戶聯絡資訊，未帶 scheme 的項目視為電子郵件。
    pub contact: Vec<String>,
    /// 略過本機 HTTP 自我檢查；只在本機無法連回自身網域時開啟。
    pub disable_local_check: bool,
    /// 兩次輪詢之間的秒數，至少為 1。
    pub poll_interval_secs: u64,
    /// 輪詢上限，未設定時不限時間。
    pub poll_timeout_secs: Option<u64>,
    /// 單一 HTTP 請求的逾時秒數。
    pub request_timeout_secs: u64,
    /// 送給 CA 的 `User-Agent`。
    pub user_agent: String,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            directory_url: LETS_ENCRYPT.to_string(),
            check_dir: PathBuf::new(),
            contact: Vec::new(),
            disable_local_check: false,
            poll_interval_secs: 2,
            poll_timeout_secs: None,
            request_timeout_secs: 30,
            user_agent: ReqwestTransport::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl IssuerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 檢查設定是否可用。
    ///
    /// # 錯誤
    ///
    /// 下列情況回傳 [`ConfigError::Invalid`]：
    ///
    /// * `directory_url` 或 `check_dir` 為空
    /// * `poll_interval_secs` 或 `request_timeout_secs` 為 0
    /// * `poll_timeout_secs` 短於 `poll_interval_secs`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory_url.trim().is_empty() {
            return Err(ConfigError::Invalid("directory_url is empty".into()));
        }
        if self.check_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("check_dir is not set".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(timeout) = self.poll_timeout_secs {
            if timeout < self.poll_interval_secs {
                return Err(ConfigError::Invalid(format!(
                    "poll_timeout_secs ({}) is shorter than poll_interval_secs ({})",
                    timeout, self.poll_interval_secs
                )));
            }
        }
        Ok(())
    }
}

/// 將時間長度轉為整數秒，不足一秒的部分不會被捨去而是回報錯誤。
pub(crate) fn whole_secs(name: &str, duration: Duration) -> Result<u64, ConfigError> {
    if duration.subsec_nanos() != 0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be a whole number of seconds, got {:?}",
            name, duration
        )));
    }
    Ok(duration.as_secs())
}
