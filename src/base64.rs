//! JOSE 使用的 base64url（無填充）編碼工具。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

pub use base64::DecodeError;

/// 已編碼為 base64url（無 `=` 填充）的資料。
///
/// # 示例
///
/// ```
/// use acme_issue::base64::Base64;
///
/// let b64 = Base64::new("{}");
/// assert_eq!(b64.base64_url(), "e30");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64 {
    encoded: String,
}

impl Base64 {
    /// 將任意位元組編碼為 base64url。
    pub fn new<T: AsRef<[u8]>>(input: T) -> Self {
        Self {
            encoded: URL_SAFE_NO_PAD.encode(input.as_ref()),
        }
    }

    /// 回傳 base64url 字串（無填充）。
    pub fn base64_url(&self) -> String {
        self.encoded.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// 解碼 base64url 字串。
    ///
    /// # 錯誤
    ///
    /// 輸入含有非 base64url 字元或長度不合法時回傳 [`DecodeError`]。
    pub fn decode_url(encoded: &str) -> Result<Vec<u8>, DecodeError> {
        URL_SAFE_NO_PAD.decode(encoded)
    }
}
