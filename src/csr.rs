use std::{collections::BTreeSet, fs, path::Path, result};

use openssl::x509::X509Req;
use thiserror::Error;
use x509_parser::{
    certification_request::X509CertificationRequest,
    extensions::{GeneralName, ParsedExtension},
    prelude::FromDer,
};

/// 讀取或解析 CSR（憑證簽名請求）時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Failed to read CSR file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Openssl error: {0}")]
    Openssl(#[from] openssl::error::ErrorStack),
    /// 內容不是可辨識的 PKCS#10 請求。
    #[error("Malformed certificate request: {0}")]
    Malformed(String),
}

type Result<T> = result::Result<T, CsrError>;

/// 已解析的 CSR，保留 DER 內容供最終確認訂單使用。
#[derive(Debug, Clone)]
pub struct Csr {
    der: Vec<u8>,
}

impl Csr {
    /// 從檔案讀取 CSR，PEM 或 DER 皆可。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_pem(&data)
    }

    /// 解析 PEM 格式的 CSR；不是 PEM 時改以 DER 解析。
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let req = X509Req::from_pem(data).or_else(|_| X509Req::from_der(data))?;
        let der = req.to_der()?;

        X509CertificationRequest::from_der(&der)
            .map_err(|e| CsrError::Malformed(e.to_string()))?;

        Ok(Self { der })
    }

    /// 收集主體 CN 與 SAN 中所有 DNS 名稱。
    ///
    /// 名稱依原樣保留，不做大小寫正規化；結果可能為空集合，
    /// 是否接受由呼叫端決定。
    pub fn domains(&self) -> Result<BTreeSet<String>> {
        let (_, req) = X509CertificationRequest::from_der(&self.der)
            .map_err(|e| CsrError::Malformed(e.to_string()))?;

        let mut domains = BTreeSet::new();

        for cn in req.certification_request_info.subject.iter_common_name() {
            let name = cn
                .as_str()
                .map_err(|e| CsrError::Malformed(e.to_string()))?;
            domains.insert(name.to_string());
        }

        if let Some(extensions) = req.requested_extensions() {
            for extension in extensions {
                if let ParsedExtension::SubjectAlternativeName(san) = extension {
                    for name in &san.general_names {
                        if let GeneralName::DNSName(dns) = name {
                            domains.insert(dns.to_string());
                        }
                    }
                }
            }
        }

        Ok(domains)
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }
}

#[cfg(test)]
mod tests {
    use openssl::{
        hash::MessageDigest,
        pkey::PKey,
        rsa::Rsa,
        stack::Stack,
        x509::{extension::SubjectAlternativeName, X509NameBuilder},
    };

    use super::*;

    fn build_csr(cn: Option<&str>, san: &[&str]) -> X509Req {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut builder = X509Req::builder().unwrap();

        if let Some(cn) = cn {
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", cn).unwrap();
            builder.set_subject_name(&name.build()).unwrap();
        }

        if !san.is_empty() {
            let mut san_builder = SubjectAlternativeName::new();
            for entry in san {
                san_builder.dns(entry);
            }
            let extension = san_builder.build(&builder.x509v3_context(None)).unwrap();
            let mut stack = Stack::new().unwrap();
            stack.push(extension).unwrap();
            builder.add_extensions(&stack).unwrap();
        }

        builder.set_pubkey(&key).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    #[test]
    fn test_common_name_and_san() -> Result<()> {
        let req = build_csr(Some("example.com"), &["a.example.com", "b.example.com"]);
        let csr = Csr::from_pem(&req.to_pem()?)?;

        let expected: BTreeSet<String> = ["example.com", "a.example.com", "b.example.com"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(csr.domains()?, expected);
        assert_eq!(csr.to_der(), req.to_der()?.as_slice());
        Ok(())
    }

    #[test]
    fn test_duplicate_names_collapse() -> Result<()> {
        let req = build_csr(Some("example.com"), &["example.com", "www.example.com"]);
        let csr = Csr::from_pem(&req.to_der()?)?;
        assert_eq!(csr.domains()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_case_is_preserved() -> Result<()> {
        let req = build_csr(None, &["Example.COM"]);
        let csr = Csr::from_pem(&req.to_pem()?)?;
        assert!(csr.domains()?.contains("Example.COM"));
        Ok(())
    }

    #[test]
    fn test_no_domains_is_empty_set() -> Result<()> {
        let req = build_csr(None, &[]);
        let csr = Csr::from_pem(&req.to_pem()?)?;
        assert!(csr.domains()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Csr::from_pem(b"-----BEGIN CERTIFICATE REQUEST-----\nnope").is_err());
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("domain.csr");
        std::fs::write(&path, build_csr(Some("file.test"), &[]).to_pem()?)?;

        let csr = Csr::from_file(&path)?;
        assert!(csr.domains()?.contains("file.test"));
        assert!(matches!(
            Csr::from_file(dir.path().join("missing.csr")),
            Err(CsrError::Io(_))
        ));
        Ok(())
    }
}
