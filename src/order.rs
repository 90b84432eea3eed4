//! 訂單流程：建立訂單、逐一驗證網域、最終確認並等待 CA 簽發。

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    certificate::{Certificate, CertificateError},
    challenge::{Authorization, AuthorizationStatus, ChallengeError, ChallengeResponder},
    client::{AcmeClient, RequestError},
    csr::Csr,
    payload::{ChallengeReadyPayload, FinalizeOrderPayload, Identifier, NewOrderPayload},
    poll::{PollError, Pollable, Poller},
    session::Session,
    signature::Signer,
    transport::Transport,
};

/// 訂單操作可能產生的錯誤。
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("No domains to order")]
    NoDomains,
    #[error("newOrder response from {0} has no Location header")]
    MissingLocation(String),
    /// 授權最終狀態不是 `valid`，整張訂單失敗。
    #[error("Challenge did not pass for {domain}: {authorization:?}")]
    ValidationFailed {
        domain: String,
        authorization: Box<Authorization>,
    },
    #[error("Order failed with status {status}: {order:?}")]
    OrderFailed { status: OrderStatus, order: Box<Order> },
    #[error("Order is valid but has no certificate URL")]
    MissingCertificate,
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),
    #[error("Poll error: {0}")]
    Poll(#[from] PollError),
    #[error("Request error: {0}")]
    Request(#[from] RequestError),
    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
}

type Result<T> = std::result::Result<T, OrderError>;

/// 訂單狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Ready => "ready",
            OrderStatus::Processing => "processing",
            OrderStatus::Valid => "valid",
            OrderStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// CA 端的訂單資源。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub status: OrderStatus,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub authorizations: Vec<String>,
    pub finalize: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// 訂單失敗時 CA 附上的 problem document。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Pollable for Order {
    type Status = OrderStatus;

    fn status(&self) -> &OrderStatus {
        &self.status
    }
}

/// 訂單流程所處的階段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Created,
    Ordering,
    PerDomainValidation,
    Finalizing,
    Polling,
    Done,
    Failed,
}

/// 驅動一張訂單從建立到 `valid` 的狀態機。
///
/// 每個授權依序處理：發布挑戰檔案、通知 CA、輪詢直到離開 `pending`，
/// 全部通過後才送出 CSR。同一時間最多只有一個挑戰檔案存在。
#[derive(Debug)]
pub struct OrderOrchestrator<'a> {
    responder: &'a ChallengeResponder,
    poller: &'a Poller,
    state: OrderState,
}

impl<'a> OrderOrchestrator<'a> {
    pub fn new(responder: &'a ChallengeResponder, poller: &'a Poller) -> Self {
        Self {
            responder,
            poller,
            state: OrderState::Created,
        }
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    fn transition(&mut self, next: OrderState) {
        debug!(from = ?self.state, to = ?next, "order state changed");
        self.state = next;
    }

    /// 為 `domains` 申請憑證，回傳狀態為 `valid` 的訂單；
    /// 憑證下載網址在 [`Order::certificate`]。
    ///
    /// # 錯誤
    ///
    /// 任何一步失敗都會使狀態變為 [`OrderState::Failed`] 並回傳 [`OrderError`]。
    pub fn run<T, S>(
        &mut self,
        client: &mut AcmeClient<T, S>,
        session: &Session,
        domains: &BTreeSet<String>,
        csr: &Csr,
    ) -> Result<Order>
    where
        T: Transport,
        S: Signer,
    {
        let result = self.execute(client, session, domains, csr);
        if result.is_err() {
            self.transition(OrderState::Failed);
        }
        result
    }

    fn execute<T: Transport, S: Signer>(
        &mut self,
        client: &mut AcmeClient<T, S>,
        session: &Session,
        domains: &BTreeSet<String>,
        csr: &Csr,
    ) -> Result<Order> {
        if domains.is_empty() {
            return Err(OrderError::NoDomains);
        }

        self.transition(OrderState::Ordering);
        let new_order = &session.directory().new_order;
        let response = client.signed_request(
            new_order,
            &NewOrderPayload::new(domains.iter().cloned()),
            session.key_id(),
        )?;
        let location = response
            .location()
            .map(str::to_string)
            .ok_or_else(|| OrderError::MissingLocation(new_order.clone()))?;
        let order: Order = response.json()?;
        info!(order = %location, domains = ?domains, "order created");

        self.transition(OrderState::PerDomainValidation);
        for auth_url in &order.authorizations {
            self.authorize(client, session, auth_url)?;
        }

        self.transition(OrderState::Finalizing);
        client.signed_request(
            &order.finalize,
            &FinalizeOrderPayload::new(csr.to_der()),
            session.key_id(),
        )?;

        self.transition(OrderState::Polling);
        let order: Order = self.poller.poll_until_not(
            client,
            &location,
            &[OrderStatus::Pending, OrderStatus::Processing],
        )?;
        if order.status != OrderStatus::Valid {
            return Err(OrderError::OrderFailed {
                status: order.status,
                order: Box::new(order),
            });
        }

        info!(order = %location, certificate = ?order.certificate, "order valid");
        self.transition(OrderState::Done);
        Ok(order)
    }

    fn authorize<T: Transport, S: Signer>(
        &self,
        client: &mut AcmeClient<T, S>,
        session: &Session,
        auth_url: &str,
    ) -> Result<()> {
        let authorization: Authorization = client.get(auth_url)?.json()?;
        let domain = authorization.domain().to_string();

        if authorization.status == AuthorizationStatus::Valid {
            info!(domain = %domain, "authorization already valid");
            return Ok(());
        }

        info!(domain = %domain, "verifying domain");
        let challenge = authorization.http01()?;
        let path = self.responder.respond(
            client.transport(),
            &domain,
            challenge,
            session.thumbprint(),
        )?;

        let result = self.confirm(client, session, &challenge.url, auth_url);
        self.responder.cleanup(&path);
        let authorization = result?;

        if authorization.status != AuthorizationStatus::Valid {
            return Err(OrderError::ValidationFailed {
                domain,
                authorization: Box::new(authorization),
            });
        }

        info!(domain = %domain, "domain verified");
        Ok(())
    }

    /// 通知 CA 挑戰已就緒，並等待授權離開 `pending`。
    fn confirm<T: Transport, S: Signer>(
        &self,
        client: &mut AcmeClient<T, S>,
        session: &Session,
        challenge_url: &str,
        auth_url: &str,
    ) -> Result<Authorization> {
        client.signed_request(
            challenge_url,
            &ChallengeReadyPayload::default(),
            session.key_id(),
        )?;
        Ok(self
            .poller
            .poll_until_not(client, auth_url, &[AuthorizationStatus::Pending])?)
    }
}

/// 以未簽章 GET 下載 PEM 憑證鏈。
pub fn download_certificate<T: Transport, S: Signer>(
    client: &mut AcmeClient<T, S>,
    url: &str,
) -> Result<Certificate> {
    let response = client.get(url)?;
    let certificate = Certificate::from_pem(response.text())?;
    info!(url, "certificate downloaded");
    Ok(certificate)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use openssl::{
        hash::MessageDigest,
        pkey::PKey,
        rsa::Rsa,
        stack::Stack,
        x509::{extension::SubjectAlternativeName, X509Req},
    };
    use reqwest::Method;

    use super::*;
    use crate::{
        directory::Directory,
        jws::Jws,
        key::AccountKey,
        nonce::REPLAY_NONCE,
        poll::CountingSleep,
        signature::OpensslSigner,
        transport::{HttpResponse, MockTransport},
    };

    const ACCOUNT: &str = "https://ca.test/acct/1";
    const ORDER: &str = "https://ca.test/order/1";
    const AUTHZ: &str = "https://ca.test/authz/1";
    const CHALL: &str = "https://ca.test/chall/1";
    const FINALIZE: &str = "https://ca.test/order/1/finalize";
    const WELL_KNOWN: &str = "http://example.com/.well-known/acme-challenge/abc123";

    struct Fixture {
        mock: MockTransport,
        session: Session,
        key: AccountKey,
        dir: tempfile::TempDir,
        csr: Csr,
    }

    impl Fixture {
        fn new() -> Self {
            let directory = Directory {
                new_account: "https://ca.test/new-acct".into(),
                new_nonce: "https://ca.test/new-nonce".into(),
                new_order: "https://ca.test/new-order".into(),
                revoke_cert: "https://ca.test/revoke".into(),
                key_change: "https://ca.test/key-change".into(),
                renewal_info: None,
                meta: None,
            };
            let mock = MockTransport::new();
            mock.push(
                Method::HEAD,
                &directory.new_nonce,
                HttpResponse::new(200, "").with_header(REPLAY_NONCE, "n"),
            );

            let key = AccountKey::generate(2048).unwrap();
            let (jwk, thumbprint) = key.derive().unwrap();
            let session = Session::new(directory, jwk, thumbprint).registered(ACCOUNT);

            Self {
                mock,
                session,
                key,
                dir: tempfile::tempdir().unwrap(),
                csr: csr(&["example.com"]),
            }
        }

        fn key_auth(&self) -> String {
            format!("abc123.{}", self.session.thumbprint())
        }

        fn script_order(&self) {
            self.mock.push(
                Method::POST,
                "https://ca.test/new-order",
                HttpResponse::new(
                    201,
                    format!(
                        r#"{{"status":"pending","identifiers":[{{"type":"dns","value":"example.com"}}],"authorizations":["{}"],"finalize":"{}"}}"#,
                        AUTHZ, FINALIZE
                    ),
                )
                .with_header("Location", ORDER),
            );
        }

        fn script_authorization(&self, statuses: &[&str]) {
            for status in statuses {
                self.mock.push(
                    Method::GET,
                    AUTHZ,
                    HttpResponse::new(
                        200,
                        format!(
                            r#"{{"identifier":{{"type":"dns","value":"example.com"}},"status":"{}","challenges":[{{"type":"http-01","url":"{}","token":"abc123","status":"pending"}}]}}"#,
                            status, CHALL
                        ),
                    ),
                );
            }
            self.mock
                .push(Method::GET, WELL_KNOWN, HttpResponse::new(200, self.key_auth()));
            self.mock
                .push(Method::POST, CHALL, HttpResponse::new(200, r#"{"status":"processing"}"#));
        }

        fn script_finalize(&self, statuses: &[&str]) {
            self.mock.push(
                Method::POST,
                FINALIZE,
                HttpResponse::new(200, order_body("processing")),
            );
            for status in statuses {
                self.mock
                    .push(Method::GET, ORDER, HttpResponse::new(200, order_body(status)));
            }
        }

        fn client(&self) -> AcmeClient<&MockTransport, OpensslSigner> {
            AcmeClient::new(&self.mock, self.key.signer(), self.session.directory())
        }
    }

    fn order_body(status: &str) -> String {
        let certificate = if status == "valid" {
            r#","certificate":"https://ca.test/cert/1""#
        } else {
            ""
        };
        format!(
            r#"{{"status":"{}","authorizations":["{}"],"finalize":"{}"{}}}"#,
            status, AUTHZ, FINALIZE, certificate
        )
    }

    fn csr(domains: &[&str]) -> Csr {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut builder = X509Req::builder().unwrap();
        let mut san = SubjectAlternativeName::new();
        for domain in domains {
            san.dns(domain);
        }
        let extension = san.build(&builder.x509v3_context(None)).unwrap();
        let mut stack = Stack::new().unwrap();
        stack.push(extension).unwrap();
        builder.add_extensions(&stack).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        Csr::from_pem(&builder.build().to_pem().unwrap()).unwrap()
    }

    fn challenge_path(responder: &ChallengeResponder, token: &str) -> PathBuf {
        responder
            .check_dir()
            .join(crate::challenge::sanitize_token(token))
    }

    fn domains() -> BTreeSet<String> {
        BTreeSet::from(["example.com".to_string()])
    }

    #[test]
    fn test_happy_path() -> Result<()> {
        let fx = Fixture::new();
        fx.script_order();
        fx.script_authorization(&["pending", "pending", "valid"]);
        fx.script_finalize(&["processing", "valid"]);

        let responder = ChallengeResponder::new(fx.dir.path());
        let sleeper = CountingSleep::new();
        let poller = Poller::default().sleeper(sleeper.clone());
        let mut orchestrator = OrderOrchestrator::new(&responder, &poller);

        let order = orchestrator.run(&mut fx.client(), &fx.session, &domains(), &fx.csr)?;
        assert_eq!(order.status, OrderStatus::Valid);
        assert_eq!(order.certificate.as_deref(), Some("https://ca.test/cert/1"));
        assert_eq!(orchestrator.state(), OrderState::Done);

        // 授權與訂單各等待一次
        assert_eq!(sleeper.count(), 2);
        assert!(!challenge_path(&responder, "abc123").exists());

        let finalize = fx
            .mock
            .requests()
            .into_iter()
            .find(|r| r.url == FINALIZE)
            .unwrap();
        let jws: Jws = serde_json::from_str(finalize.body.as_deref().unwrap())?;
        let payload = jws.payload_json().unwrap();
        assert_eq!(
            payload["csr"],
            crate::base64::Base64::new(fx.csr.to_der()).base64_url()
        );
        assert_eq!(jws.header().unwrap().kid.as_deref(), Some(ACCOUNT));

        let ready = fx.mock.requests().into_iter().find(|r| r.url == CHALL).unwrap();
        let jws: Jws = serde_json::from_str(ready.body.as_deref().unwrap())?;
        assert_eq!(jws.payload, "e30");
        Ok(())
    }

    #[test]
    fn test_order_invalid_after_processing() {
        let fx = Fixture::new();
        fx.script_order();
        fx.script_authorization(&["pending", "valid"]);
        fx.script_finalize(&["processing", "processing", "invalid"]);

        let responder = ChallengeResponder::new(fx.dir.path());
        let sleeper = CountingSleep::new();
        let poller = Poller::default().sleeper(sleeper.clone());
        let mut orchestrator = OrderOrchestrator::new(&responder, &poller);

        let err = orchestrator
            .run(&mut fx.client(), &fx.session, &domains(), &fx.csr)
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::OrderFailed {
                status: OrderStatus::Invalid,
                ..
            }
        ));
        assert_eq!(orchestrator.state(), OrderState::Failed);
        assert_eq!(fx.mock.count(&Method::GET, "https://ca.test/cert/1"), 0);
    }

    #[test]
    fn test_invalid_authorization_stops_before_finalize() {
        let fx = Fixture::new();
        fx.script_order();
        fx.script_authorization(&["pending", "invalid"]);

        let responder = ChallengeResponder::new(fx.dir.path());
        let poller = Poller::default().sleeper(CountingSleep::new());
        let mut orchestrator = OrderOrchestrator::new(&responder, &poller);

        let err = orchestrator
            .run(&mut fx.client(), &fx.session, &domains(), &fx.csr)
            .unwrap_err();
        match err {
            OrderError::ValidationFailed {
                domain,
                authorization,
            } => {
                assert_eq!(domain, "example.com");
                assert_eq!(authorization.status, AuthorizationStatus::Invalid);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.mock.count(&Method::POST, FINALIZE), 0);
        assert!(!challenge_path(&responder, "abc123").exists());
    }

    #[test]
    fn test_self_check_failure_never_notifies_ca() {
        let fx = Fixture::new();
        fx.script_order();
        fx.mock.push(
            Method::GET,
            WELL_KNOWN,
            HttpResponse::new(404, "not found"),
        );
        fx.script_authorization(&["pending"]);

        let responder = ChallengeResponder::new(fx.dir.path());
        let poller = Poller::default().sleeper(CountingSleep::new());
        let mut orchestrator = OrderOrchestrator::new(&responder, &poller);

        let err = orchestrator
            .run(&mut fx.client(), &fx.session, &domains(), &fx.csr)
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Challenge(ChallengeError::ValidationFailed { .. })
        ));
        assert_eq!(fx.mock.count(&Method::POST, CHALL), 0);
    }

    #[test]
    fn test_no_domains() {
        let fx = Fixture::new();
        let responder = ChallengeResponder::new(fx.dir.path());
        let poller = Poller::default();
        let mut orchestrator = OrderOrchestrator::new(&responder, &poller);

        let err = orchestrator
            .run(&mut fx.client(), &fx.session, &BTreeSet::new(), &fx.csr)
            .unwrap_err();
        assert!(matches!(err, OrderError::NoDomains));
        assert!(fx.mock.requests().is_empty());
    }

    #[test]
    fn test_download_certificate_rejects_garbage() {
        let fx = Fixture::new();
        fx.mock
            .push(Method::GET, "https://ca.test/cert/1", HttpResponse::new(200, "oops"));

        let result = download_certificate(&mut fx.client(), "https://ca.test/cert/1");
        assert!(matches!(result, Err(OrderError::Certificate(_))));
    }
}
