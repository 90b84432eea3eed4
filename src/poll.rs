//! 輪詢 CA 資源直到離開等待狀態。

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::{
    client::{AcmeClient, RequestError},
    signature::Signer,
    transport::Transport,
};

/// 預設輪詢間隔。
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
/// 最短輪詢間隔，更短的設定會被提高到此值。
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// 輪詢時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Poll request failed: {0}")]
    Request(#[from] RequestError),
    #[error("Unexpected resource body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{url} still pending after {waited:?}")]
    Timeout { url: String, waited: Duration },
}

/// 可被輪詢的 CA 資源。
pub trait Pollable: DeserializeOwned {
    type Status: PartialEq + fmt::Debug;

    fn status(&self) -> &Self::Status;
}

/// 兩次輪詢之間的等待方式。
///
/// 正式環境使用 [`ThreadSleep`]；測試以 [`CountingSleep`] 取代，不實際等待。
pub trait Sleep {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleep + ?Sized> Sleep for Box<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// 以 [`thread::sleep`] 阻塞目前執行緒。
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 只記錄次數、不實際等待，通常用於測試。複製出的值共用同一組計數。
#[derive(Debug, Clone, Default)]
pub struct CountingSleep {
    count: Arc<AtomicUsize>,
    total_ms: Arc<AtomicU64>,
}

impl CountingSleep {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已呼叫 [`Sleep::sleep`] 的次數。
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// 累計要求等待的時間，以毫秒為單位累加。
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms.load(Ordering::SeqCst))
    }
}

impl Sleep for CountingSleep {
    fn sleep(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.total_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

/// 固定間隔的輪詢器。
///
/// `timeout` 為 `None` 時不設上限，資源一直停留在等待狀態就一直輪詢。
pub struct Poller {
    interval: Duration,
    timeout: Option<Duration>,
    sleeper: Box<dyn Sleep>,
}

impl Poller {
    /// 建立一個以固定間隔輪詢、不設上限的輪詢器。
    ///
    /// # 參數
    ///
    /// * `interval` - 兩次 GET 之間等待的時間，短於 [`MIN_INTERVAL`] 時以 [`MIN_INTERVAL`] 取代。
    ///
    /// # 範例
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use acme_issue::poll::Poller;
    /// let poller = Poller::new(Duration::from_secs(5)).timeout(Some(Duration::from_secs(300)));
    /// assert_eq!(poller.interval(), Duration::from_secs(5));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            timeout: None,
            sleeper: Box::new(ThreadSleep),
        }
    }

    /// 設定累計等待的上限，`None` 表示不限時間。
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 替換等待方式，測試中通常傳入 [`CountingSleep`]。
    pub fn sleeper(mut self, sleeper: impl Sleep + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 反覆以未簽章 GET 取得 `url`，直到狀態不在 `pending` 之中。
    ///
    /// 第一次取得的狀態就不在等待集合時立即回傳，不會等待。
    ///
    /// # 錯誤
    ///
    /// 請求失敗、回應無法解析，或設定了逾時且累計等待將超過上限時回傳 [`PollError`]。
    pub fn poll_until_not<R, T, S>(
        &self,
        client: &mut AcmeClient<T, S>,
        url: &str,
        pending: &[R::Status],
    ) -> Result<R, PollError>
    where
        R: Pollable,
        T: Transport,
        S: Signer,
    {
        let mut waited = Duration::ZERO;

        loop {
            let resource: R = client.get(url)?.json()?;
            let status = resource.status();
            if !pending.contains(status) {
                debug!(url, status = ?status, "resource left pending state");
                return Ok(resource);
            }

            if let Some(timeout) = self.timeout {
                if waited + self.interval > timeout {
                    return Err(PollError::Timeout {
                        url: url.to_string(),
                        waited,
                    });
                }
            }

            debug!(url, status = ?status, "resource still pending");
            self.sleeper.sleep(self.interval);
            waited += self.interval;
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
