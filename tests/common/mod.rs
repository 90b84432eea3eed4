#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use acme_issue::{
    jws::Jws,
    nonce::REPLAY_NONCE,
    transport::{HttpResponse, MockTransport},
};
use openssl::{
    asn1::Asn1Time,
    hash::MessageDigest,
    pkey::PKey,
    rsa::Rsa,
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509Builder, X509NameBuilder, X509Req},
};
use reqwest::Method;

pub const DIRECTORY: &str = "https://ca.test/directory";
pub const NEW_NONCE: &str = "https://ca.test/acme/new-nonce";
pub const NEW_ACCOUNT: &str = "https://ca.test/acme/new-acct";
pub const NEW_ORDER: &str = "https://ca.test/acme/new-order";
pub const REVOKE: &str = "https://ca.test/acme/revoke-cert";
pub const KEY_CHANGE: &str = "https://ca.test/acme/key-change";

pub const ACCOUNT: &str = "https://ca.test/acme/acct/42";
pub const ORDER: &str = "https://ca.test/acme/order/42/1";
pub const AUTHZ: &str = "https://ca.test/acme/authz/1";
pub const CHALLENGE: &str = "https://ca.test/acme/chall/1";
pub const FINALIZE: &str = "https://ca.test/acme/order/42/1/finalize";
pub const CERT: &str = "https://ca.test/acme/cert/1";

pub const TOKEN: &str = "abc123";
pub const WELL_KNOWN: &str = "http://example.com/.well-known/acme-challenge/abc123";

/// 模擬的 CA：每個回應都帶上不重複的 `Replay-Nonce`。
pub struct Ca {
    pub mock: MockTransport,
    counter: AtomicUsize,
}

impl Ca {
    pub fn new() -> Self {
        let ca = Self {
            mock: MockTransport::new(),
            counter: AtomicUsize::new(0),
        };
        ca.mock.push(
            Method::GET,
            DIRECTORY,
            HttpResponse::new(
                200,
                format!(
                    r#"{{"newNonce":"{}","newAccount":"{}","newOrder":"{}","revokeCert":"{}","keyChange":"{}","meta":{{"termsOfService":"https://ca.test/tos.pdf"}}}}"#,
                    NEW_NONCE, NEW_ACCOUNT, NEW_ORDER, REVOKE, KEY_CHANGE
                ),
            ),
        );
        ca.mock.push(Method::HEAD, NEW_NONCE, ca.reply(200, ""));
        ca
    }

    pub fn reply(&self, status: u16, body: impl Into<Vec<u8>>) -> HttpResponse {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        HttpResponse::new(status, body).with_header(REPLAY_NONCE, &format!("nonce-{}", n))
    }

    pub fn account(&self, status: u16) {
        self.mock.push(
            Method::POST,
            NEW_ACCOUNT,
            self.reply(status, r#"{"status":"valid"}"#)
                .with_header("Location", ACCOUNT),
        );
    }

    pub fn order(&self) {
        self.mock.push(
            Method::POST,
            NEW_ORDER,
            self.reply(201, order_body("pending")).with_header("Location", ORDER),
        );
    }

    /// 第一個狀態供取得授權，其餘供輪詢。
    pub fn authorization(&self, statuses: &[&str], key_auth: &str) {
        for status in statuses {
            self.mock.push(
                Method::GET,
                AUTHZ,
                self.reply(
                    200,
                    format!(
                        r#"{{"identifier":{{"type":"dns","value":"example.com"}},"status":"{}","challenges":[{{"type":"tls-alpn-01","url":"https://ca.test/acme/chall/9","token":"zzz","status":"pending"}},{{"type":"http-01","url":"{}","token":"{}","status":"pending"}}]}}"#,
                        status, CHALLENGE, TOKEN
                    ),
                ),
            );
        }
        self.mock
            .push(Method::GET, WELL_KNOWN, HttpResponse::new(200, key_auth));
        self.mock.push(
            Method::POST,
            CHALLENGE,
            self.reply(200, r#"{"type":"http-01","status":"processing"}"#),
        );
    }

    pub fn finalize(&self, statuses: &[&str]) {
        self.mock
            .push(Method::POST, FINALIZE, self.reply(200, order_body("processing")));
        for status in statuses {
            self.mock
                .push(Method::GET, ORDER, self.reply(200, order_body(status)));
        }
        self.mock
            .push(Method::GET, CERT, HttpResponse::new(200, certificate_chain()));
    }

    /// 所有送出的簽章請求，依序排列。
    pub fn signed_requests(&self) -> Vec<(String, Jws)> {
        self.mock
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::POST)
            .map(|r| {
                let jws = serde_json::from_str(r.body.as_deref().unwrap()).unwrap();
                (r.url, jws)
            })
            .collect()
    }
}

pub fn order_body(status: &str) -> String {
    let certificate = if status == "valid" {
        format!(r#","certificate":"{}""#, CERT)
    } else {
        String::new()
    };
    format!(
        r#"{{"status":"{}","identifiers":[{{"type":"dns","value":"example.com"}}],"authorizations":["{}"],"finalize":"{}"{}}}"#,
        status, AUTHZ, FINALIZE, certificate
    )
}

pub fn csr_pem(cn: &str, san: &[&str]) -> Vec<u8> {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut builder = X509Req::builder().unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    builder.set_subject_name(&name.build()).unwrap();

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
    builder.build().to_pem().unwrap()
}

pub fn nameless_csr_pem() -> Vec<u8> {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut builder = X509Req::builder().unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    builder.build().to_pem().unwrap()
}

fn self_signed(cn: &str) -> String {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(90).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
}

pub fn certificate_chain() -> String {
    format!("{}{}", self_signed("example.com"), self_signed("Test Issuer"))
}
