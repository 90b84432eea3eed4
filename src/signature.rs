use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
};

use openssl::{
    hash::MessageDigest,
    pkey::{PKey, Private},
    sign,
};
use thiserror::Error;

/// 簽章操作可能遇到的錯誤類型。
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Signing error: {0}")]
    Signing(#[from] openssl::error::ErrorStack),
    #[error("Failed to run signer command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Signer command exited with {status}: {stderr}")]
    Command { status: i32, stderr: String },
}

/// 產生分離式簽章的能力。
///
/// 協議層只依賴此介面，因此可以替換為硬體金鑰或其他密碼學實作，
/// 不需修改任何請求流程。實作不得修改金鑰內容。
pub trait Signer {
    /// 對任意位元組簽章，回傳原始簽章位元組（RS256 即 PKCS#1 v1.5 + SHA-256）。
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError>;
}

impl<S: Signer + ?Sized> Signer for &S {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        (**self).sign(data)
    }
}

impl<S: Signer + ?Sized> Signer for Box<S> {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        (**self).sign(data)
    }
}

/// 使用行程內 OpenSSL 金鑰的 RS256 簽章器。
#[derive(Debug, Clone)]
pub struct OpensslSigner {
    pri_key: PKey<Private>,
}

impl OpensslSigner {
    pub fn new(pri_key: PKey<Private>) -> Self {
        Self { pri_key }
    }
}

impl Signer for OpensslSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut signer = sign::Signer::new(MessageDigest::sha256(), &self.pri_key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }
}

/// 透過 `openssl dgst -sha256 -sign <key>` 子行程簽章。
///
/// 適用於金鑰只以檔案形式存在、不希望載入本行程的環境。
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: PathBuf,
    key_path: PathBuf,
}

impl CommandSigner {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("openssl"),
            key_path: key_path.into(),
        }
    }

    /// 指定 openssl 執行檔位置。
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Signer for CommandSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut child = Command::new(&self.program)
            .arg("dgst")
            .arg("-sha256")
            .arg("-sign")
            .arg(&self.key_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // 子行程可能在讀取前就因金鑰錯誤結束，此時以結束狀態回報
            if let Err(e) = stdin.write_all(data) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SignatureError::Command {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
