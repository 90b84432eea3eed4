//! HTTP 傳輸層抽象。
//!
//! 所有與 CA 及自我檢查相關的 HTTP 呼叫都經由 [`Transport`]，
//! 正式環境使用 [`ReqwestTransport`]，測試則使用可預先編排回應的 [`MockTransport`]。

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// JWS 請求使用的媒體類型。
pub const JOSE_JSON: &str = "application/jose+json";

/// 傳輸層錯誤。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("No scripted response for {method} {url}")]
    NoRoute { method: Method, url: String },
}

type Result<T> = std::result::Result<T, TransportError>;

/// 一次 HTTP 回應的完整內容。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 建立回應，供 [`MockTransport`] 編排測試用的 CA 回應。
    ///
    /// [`ReqwestTransport`] 直接使用伺服器回傳的 [`StatusCode`]，不經過此函式。
    ///
    /// # 參數
    ///
    /// * `status` - HTTP 狀態碼；不在 100 到 999 之間時一律視為 500。
    /// * `body` - 回應本文。
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// 附加一個標頭；無法表示為 HTTP 標頭的名稱或值會被忽略。
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// HTTP 傳輸介面。
pub trait Transport {
    fn get(&self, url: &str) -> Result<HttpResponse>;

    fn head(&self, url: &str) -> Result<HttpResponse>;

    /// 以 `application/jose+json` 送出 JWS 本文。
    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse>;
}

/// 以 `reqwest` 阻塞式客戶端實作的傳輸層。
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub const DEFAULT_USER_AGENT: &'static str =
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

    /// 建立傳輸層。
    ///
    /// # 錯誤
    ///
    /// 底層 TLS 後端初始化失敗時回傳 [`TransportError::Request`]。
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn read(response: reqwest::blocking::Response) -> Result<HttpResponse> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        Self::read(self.client.get(url).send()?)
    }

    fn head(&self, url: &str) -> Result<HttpResponse> {
        Self::read(self.client.head(url).send()?)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JOSE_JSON)
            .body(body)
            .send()?;
        Self::read(response)
    }
}

/// [`MockTransport`] 記錄下來的一次請求。
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

/// 模擬傳輸層，依 (方法, URL) 依序回傳預先排入的回應，通常用於測試。
///
/// 佇列只剩最後一個回應時會重複回傳它，方便描述「之後一直是某狀態」的情境。
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 為指定方法與 URL 排入一個回應。
    pub fn push(&self, method: Method, url: &str, response: HttpResponse) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((method, url.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// 到目前為止收到的所有請求。
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 送往指定方法與 URL 的請求數量。
    pub fn count(&self, method: &Method, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| &r.method == method && r.url == url)
            .count()
    }

    fn respond(&self, method: Method, url: &str, body: Option<String>) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                method: method.clone(),
                url: url.to_string(),
                body,
            });

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let queue = routes.get_mut(&(method.clone(), url.to_string()));
        match queue {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .ok_or_else(|| TransportError::NoRoute {
                    method,
                    url: url.to_string(),
                }),
            Some(queue) => queue.front().cloned().ok_or_else(|| TransportError::NoRoute {
                method,
                url: url.to_string(),
            }),
            None => Err(TransportError::NoRoute {
                method,
                url: url.to_string(),
            }),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        self.respond(Method::GET, url, None)
    }

    fn head(&self, url: &str) -> Result<HttpResponse> {
        self.respond(Method::HEAD, url, None)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse> {
        self.respond(Method::POST, url, Some(body))
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url)
    }

    fn head(&self, url: &str) -> Result<HttpResponse> {
        (**self).head(url)
    }

    fn post_jose(&self, url: &str, body: String) -> Result<HttpResponse> {
        (**self).post_jose(url, body)
    }
}
