//! 從 CSR 到 PEM 憑證鏈的完整流程。

use std::{path::Path, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    account::{ensure_account, AccountError, Registration},
    certificate::Certificate,
    challenge::ChallengeResponder,
    client::AcmeClient,
    config::{whole_secs, ConfigError, IssuerConfig},
    csr::{Csr, CsrError},
    directory::{Directory, DirectoryError},
    jwk::{Jwk, Thumbprint},
    key::{AccountKey, KeyError},
    order::{download_certificate, OrderError, OrderOrchestrator},
    poll::{Poller, Sleep, ThreadSleep},
    session::Session,
    signature::Signer,
    transport::{ReqwestTransport, Transport, TransportError},
};

/// 申請流程對外回報的錯誤。
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Account error: {0}")]
    Account(#[from] AccountError),
    #[error("CSR error: {0}")]
    Csr(#[from] CsrError),
    #[error("Order error: {0}")]
    Order(#[from] OrderError),
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

type Result<T> = std::result::Result<T, IssueError>;

/// 以同一把帳戶金鑰向同一個 CA 申請憑證。
///
/// 每次 [`Issuer::issue`] 都重新取得目錄並確認帳戶，不在呼叫之間保留任何狀態。
pub struct Issuer<T = ReqwestTransport> {
    config: IssuerConfig,
    transport: T,
    signer: Box<dyn Signer>,
    jwk: Jwk,
    thumbprint: Thumbprint,
    responder: ChallengeResponder,
    poller: Poller,
}

impl Issuer {
    pub fn builder(account_key: AccountKey) -> IssuerBuilder {
        IssuerBuilder::new(account_key)
    }
}

impl<T: Transport> Issuer<T> {
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn thumbprint(&self) -> &Thumbprint {
        &self.thumbprint
    }

    /// 讀取 CSR 檔案並申請憑證。
    ///
    /// # 錯誤
    ///
    /// 任何步驟失敗都回傳對應的 [`IssueError`]，不會產生部分網域的憑證。
    pub fn issue(&self, csr_path: impl AsRef<Path>) -> Result<Certificate> {
        let csr = Csr::from_file(csr_path)?;
        self.issue_csr(&csr)
    }

    pub fn issue_csr(&self, csr: &Csr) -> Result<Certificate> {
        let domains = csr.domains()?;
        if domains.is_empty() {
            return Err(OrderError::NoDomains.into());
        }
        info!(domains = ?domains, "starting certificate issuance");

        let directory = Directory::fetch(&self.transport, &self.config.directory_url)?;
        let mut client = AcmeClient::new(&self.transport, &self.signer, &directory);
        let session = Session::new(directory, self.jwk.clone(), self.thumbprint.clone());

        let registration = self.register(&mut client, &session)?;
        let session = session.registered(registration.location);

        let mut orchestrator = OrderOrchestrator::new(&self.responder, &self.poller);
        let order = orchestrator.run(&mut client, &session, &domains, csr)?;
        let url = order.certificate.ok_or(OrderError::MissingCertificate)?;

        Ok(download_certificate(&mut client, &url)?)
    }

    fn register<S: Signer>(
        &self,
        client: &mut AcmeClient<&T, S>,
        session: &Session,
    ) -> Result<Registration> {
        let registration = ensure_account(client, session, &self.config.contact)?;
        if let Some(err) = &registration.contact_error {
            warn!(error = %err, "continuing without updated contact");
        }
        Ok(registration)
    }

    /// 撤銷憑證。目前不支援，不會對 CA 發出任何請求。
    pub fn revoke(&self, certificate: &Certificate) -> Result<()> {
        warn!(
            pem_len = certificate.as_pem().len(),
            "certificate revocation requested but not supported"
        );
        Err(IssueError::Unsupported("certificate revocation"))
    }
}

/// 用於建立 [`Issuer`] 的構造器。
///
/// 預設值來自 [`IssuerConfig::default`]，簽章器預設為帳戶金鑰的行程內簽章器。
/// 設定方法中發生的錯誤會保留到 [`IssuerBuilder::build`] 時才回報。
pub struct IssuerBuilder {
    account_key: AccountKey,
    config: IssuerConfig,
    signer: Option<Box<dyn Signer>>,
    sleeper: Box<dyn Sleep>,
    error: Option<ConfigError>,
}

impl IssuerBuilder {
    /// 以帳戶金鑰建立構造器。
    ///
    /// # 參數
    ///
    /// * `account_key` - 已在 CA 註冊或即將註冊的 RSA 帳戶金鑰。
    ///
    /// # 範例
    ///
    /// ```no_run
    /// # use acme_issue::{issuer::IssuerBuilder, key::AccountKey};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let key = AccountKey::from_file("/etc/acme/account.key")?;
    /// let issuer = IssuerBuilder::new(key).check_dir("/var/www/challenges").build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(account_key: AccountKey) -> Self {
        Self {
            account_key,
            config: IssuerConfig::default(),
            signer: None,
            sleeper: Box::new(ThreadSleep),
            error: None,
        }
    }

    /// 以整份設定取代目前的設定。
    pub fn config(mut self, config: IssuerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn directory_url(mut self, url: &str) -> Self {
        self.config.directory_url = url.to_string();
        self
    }

    pub fn check_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.check_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn contact(mut self, contact: &str) -> Self {
        self.config.contact.push(contact.to_string());
        self
    }

    pub fn disable_local_check(mut self, disable: bool) -> Self {
        self.config.disable_local_check = disable;
        self
    }

    /// 設定輪詢間隔，必須是整數秒且至少一秒。
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        match whole_secs("poll interval", interval) {
            Ok(secs) => self.config.poll_interval_secs = secs,
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// 設定輪詢上限，必須是整數秒；`None` 表示不限時間。
    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        match timeout.map(|t| whole_secs("poll timeout", t)).transpose() {
            Ok(secs) => self.config.poll_timeout_secs = secs,
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// 改用其他簽章器，例如 [`CommandSigner`](crate::signature::CommandSigner)。
    ///
    /// 簽章器必須對應帳戶金鑰，否則 CA 會拒絕所有請求。
    pub fn signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Some(Box::new(signer));
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleep + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// 以 `reqwest` 傳輸層建立 [`Issuer`]。
    ///
    /// # 錯誤
    ///
    /// 設定無效、帳戶金鑰無法導出 JWK 或 HTTP 客戶端建立失敗時回傳 [`IssueError`]。
    pub fn build(self) -> Result<Issuer> {
        let transport =
            ReqwestTransport::new(&self.config.user_agent, self.config.request_timeout())?;
        self.build_with(transport)
    }

    /// 以指定的傳輸層建立 [`Issuer`]。
    pub fn build_with<T: Transport>(self, transport: T) -> Result<Issuer<T>> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        self.config.validate()?;
        let (jwk, thumbprint) = self.account_key.derive()?;
        let signer: Box<dyn Signer> = match self.signer {
            Some(signer) => signer,
            None => Box::new(self.account_key.signer()),
        };

        let responder = ChallengeResponder::new(&self.config.check_dir)
            .disable_local_check(self.config.disable_local_check);
        let poller = Poller::new(self.config.poll_interval())
            .timeout(self.config.poll_timeout())
            .sleeper(self.sleeper);

        Ok(Issuer {
            config: self.config,
            transport,
            signer,
            jwk,
            thumbprint,
            responder,
            poller,
        })
    }
}
