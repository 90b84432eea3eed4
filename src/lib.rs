//! # ACME 憑證申請核心
//!
//! 本庫透過 ACME 協議（RFC 8555）向 CA（例如 Let's Encrypt）申請網域憑證，
//! 以 HTTP-01 驗證網域所有權。輸入為帳戶私鑰、CSR 與網站伺服器公開的挑戰目錄，
//! 輸出為 PEM 格式的憑證鏈。
//!
//! ## 流程
//!
//! 1. **目錄**（[`directory`]）：取得 CA 各操作的 URL。
//! 2. **帳戶**（[`account`]）：以 `jwk` 註冊或找回帳戶，之後的請求改用 `kid`。
//! 3. **訂單**（[`order`]）：依 CSR 內的網域建立訂單，逐一完成 HTTP-01 挑戰
//!    （[`challenge`]），送出 CSR 並輪詢（[`poll`]）直到 CA 簽發。
//! 4. **下載**：以未簽章 GET 取得憑證鏈（[`certificate`]）。
//!
//! 每個簽章請求都經由 [`client::AcmeClient`]：取得一次性 nonce（[`nonce`]）、
//! 組出受保護標頭（[`protection`]）、交給 [`signature::Signer`] 簽章（[`jws`]）。
//! CA 回報 `badNonce` 時自動換 nonce 重送，最多重試 100 次。
//!
//! ## 特性
//!
//! - 簽章器可替換：行程內 OpenSSL 或 `openssl dgst` 子行程
//! - 所有 HTTP 經由 [`transport::Transport`]，測試時可用 [`transport::MockTransport`]
//! - 寫入挑戰檔案後先在本機自我檢查，失敗時刪除檔案並立即回報
//! - 日誌使用 `tracing`，本庫不安裝任何 subscriber
//!
//! ## 示例
//!
//! ```no_run
//! use acme_issue::{config::LETS_ENCRYPT_STAGING, issuer::Issuer, key::AccountKey};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = AccountKey::from_file("/etc/acme/account.key")?;
//!
//!     let issuer = Issuer::builder(key)
//!         .directory_url(LETS_ENCRYPT_STAGING)
//!         .check_dir("/var/www/challenges")
//!         .contact("admin@example.com")
//!         .build()?;
//!
//!     let certificate = issuer.issue("/etc/acme/example.com.csr")?;
//!     std::fs::write("/etc/acme/example.com.crt", certificate.as_pem())?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod client;
pub mod config;
pub mod csr;
pub mod directory;
pub mod issuer;
pub mod jwk;
pub mod jws;
pub mod key;
pub mod nonce;
pub mod order;
pub mod payload;
pub mod poll;
pub mod protection;
pub mod session;
pub mod signature;
pub mod transport;

pub use certificate::Certificate;
pub use config::IssuerConfig;
pub use issuer::{IssueError, Issuer, IssuerBuilder};
pub use key::AccountKey;
