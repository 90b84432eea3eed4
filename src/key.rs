use std::{fs, io, path::Path};

use openssl::{
    error::ErrorStack,
    pkey::{Id, PKey, Private},
    rsa::Rsa,
};
use thiserror::Error;

use crate::{
    jwk::{Jwk, JwkError, Thumbprint},
    signature::OpensslSigner,
};

/// 帳戶金鑰載入與轉換時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Failed to read key file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse private key: {0}")]
    Parse(#[from] ErrorStack),
    #[error("Account key is not RSA (found {0:?})")]
    NotRsa(Id),
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
}

type Result<T> = std::result::Result<T, KeyError>;

/// 呼叫端持有的 ACME 帳戶私鑰。
///
/// 本庫只讀取金鑰，不會寫回或修改任何金鑰檔案。
#[derive(Debug, Clone)]
pub struct AccountKey {
    pri_key: PKey<Private>,
}

impl AccountKey {
    /// 從 PEM 格式的私鑰（PKCS#1 或 PKCS#8）建立帳戶金鑰。
    ///
    /// # 錯誤
    ///
    /// 無法解析時回傳 [`KeyError::Parse`]，非 RSA 金鑰回傳 [`KeyError::NotRsa`]。
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pem)?;
        Self::from_pkey(pri_key)
    }

    /// 從檔案讀取 PEM 私鑰。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let pem = fs::read(path)?;
        Self::from_pem(&pem)
    }

    pub fn from_pkey(pri_key: PKey<Private>) -> Result<Self> {
        match pri_key.id() {
            Id::RSA => Ok(Self { pri_key }),
            other => Err(KeyError::NotRsa(other)),
        }
    }

    /// 產生新的 RSA 金鑰，主要供測試與工具使用。
    pub fn generate(bits: u32) -> Result<Self> {
        let rsa = Rsa::generate(bits)?;
        Self::from_pkey(PKey::from_rsa(rsa)?)
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.pri_key
    }

    /// 推導出公開金鑰的 JWK 與其 thumbprint。
    pub fn derive(&self) -> Result<(Jwk, Thumbprint)> {
        let jwk = Jwk::from_key(&self.pri_key)?;
        let thumbprint = jwk.thumbprint()?;
        Ok((jwk, thumbprint))
    }

    /// 以此金鑰建立行程內的 RS256 簽章器。
    pub fn signer(&self) -> OpensslSigner {
        OpensslSigner::new(self.pri_key.clone())
    }

    /// RSA 金鑰的位元長度。
    pub fn bits(&self) -> Result<u32> {
        Ok(self.pri_key.rsa()?.size() * 8)
    }
}
