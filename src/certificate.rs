use chrono::{DateTime, Utc};
use openssl::{asn1::Asn1Time, x509::X509};
use thiserror::Error;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    Parse(#[from] openssl::error::ErrorStack),
    #[error("No certificate found in PEM data")]
    Empty,
    #[error("Invalid expiration timestamp")]
    InvalidTimestamp,
}

type Result<T> = std::result::Result<T, CertificateError>;

/// CA 簽發的 PEM 憑證鏈，第一張為網域憑證。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pem: String,
}

impl Certificate {
    /// 驗證 PEM 內至少有一張可解析的憑證後保存原文。
    ///
    /// # 錯誤
    ///
    /// 內容無法解析或不含任何憑證時回傳 [`CertificateError`]。
    pub fn from_pem(pem: impl Into<String>) -> Result<Self> {
        let pem = pem.into();
        if X509::stack_from_pem(pem.as_bytes())?.is_empty() {
            return Err(CertificateError::Empty);
        }
        Ok(Certificate { pem })
    }

    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    pub fn into_pem(self) -> String {
        self.pem
    }

    /// 鏈中的憑證數量。
    pub fn chain_len(&self) -> Result<usize> {
        Ok(X509::stack_from_pem(self.pem.as_bytes())?.len())
    }

    /// 網域憑證的到期時間（`notAfter`）。
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        let leaf = X509::stack_from_pem(self.pem.as_bytes())?
            .into_iter()
            .next()
            .ok_or(CertificateError::Empty)?;

        let epoch = Asn1Time::from_unix(0)?;
        let diff = epoch.diff(leaf.not_after())?;
        let seconds = diff.days as i64 * 86400 + diff.secs as i64;

        DateTime::from_timestamp(seconds, 0).ok_or(CertificateError::InvalidTimestamp)
    }
}

#[cfg(test)]
mod tests {
    use openssl::{
        asn1::Asn1Time,
        bn::BigNum,
        hash::MessageDigest,
        pkey::PKey,
        rsa::Rsa,
        x509::{X509Builder, X509NameBuilder},
    };

    use super::*;

    fn self_signed(cn: &str, not_after_unix: i64) -> String {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(1_700_000_000).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(not_after_unix).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
    }

    #[test]
    fn test_chain_and_expiry() -> Result<()> {
        let leaf = self_signed("example.com", 1_800_000_000);
        let issuer = self_signed("Test CA", 1_900_000_000);
        let cert = Certificate::from_pem(format!("{}{}", leaf, issuer))?;

        assert_eq!(cert.chain_len()?, 2);
        assert_eq!(cert.expires_at()?.timestamp(), 1_800_000_000);
        assert!(cert.as_pem().starts_with("-----BEGIN CERTIFICATE-----"));
        Ok(())
    }

    #[test]
    fn test_rejects_non_certificate() {
        assert!(Certificate::from_pem("not a certificate").is_err());
    }
}
