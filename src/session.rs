use crate::{
    directory::Directory,
    jwk::{Jwk, Thumbprint},
    protection::KeyId,
};

/// 一次憑證申請期間不變的狀態。
///
/// 目錄、JWK 與 thumbprint 在建立時決定；帳戶註冊成功後以
/// [`Session::registered`] 產生帶有帳戶 URL 的新值，而不是原地修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    directory: Directory,
    jwk: Jwk,
    thumbprint: Thumbprint,
    account_location: Option<String>,
}

impl Session {
    /// 建立尚未註冊帳戶的工作階段，簽章請求會在標頭中帶入完整 `jwk`。
    ///
    /// # 參數
    ///
    /// * `directory` - 本次申請取得的 CA 目錄。
    /// * `jwk` - 帳戶公鑰。
    /// * `thumbprint` - `jwk` 的 SHA-256 thumbprint，用於組成 key authorization。
    ///
    /// # 範例
    ///
    /// ```
    /// # use acme_issue::{directory::Directory, key::AccountKey, session::Session};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let directory: Directory = serde_json::from_str(
    ///     r#"{"newAccount": "https://ca.test/new-acct", "newNonce": "https://ca.test/new-nonce",
    ///         "newOrder": "https://ca.test/new-order", "revokeCert": "https://ca.test/revoke",
    ///         "keyChange": "https://ca.test/key-change"}"#,
    /// )?;
    /// let (jwk, thumbprint) = AccountKey::generate(2048)?.derive()?;
    ///
    /// let session = Session::new(directory, jwk, thumbprint);
    /// assert!(session.account_location().is_none());
    ///
    /// let session = session.registered("https://ca.test/acct/1");
    /// assert_eq!(session.account_location(), Some("https://ca.test/acct/1"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(directory: Directory, jwk: Jwk, thumbprint: Thumbprint) -> Self {
        Self {
            directory,
            jwk,
            thumbprint,
            account_location: None,
        }
    }

    /// 帶入帳戶 URL，之後的請求改以 `kid` 識別。
    pub fn registered(self, account_location: impl Into<String>) -> Self {
        Self {
            account_location: Some(account_location.into()),
            ..self
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn thumbprint(&self) -> &Thumbprint {
        &self.thumbprint
    }

    /// 帳戶 URL，註冊前為 `None`。
    pub fn account_location(&self) -> Option<&str> {
        self.account_location.as_deref()
    }

    /// 註冊前使用 `jwk`，註冊後使用 `kid`。
    pub fn key_id(&self) -> KeyId<'_> {
        match &self.account_location {
            Some(kid) => KeyId::Kid(kid),
            None => KeyId::Jwk(&self.jwk),
        }
    }
}
