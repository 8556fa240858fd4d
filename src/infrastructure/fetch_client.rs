//! 弹性抓取客户端 - 基础设施层
//!
//! ## 职责
//!
//! 1. **预热延迟**：第一次请求前固定等待，与重试退避无关
//! 2. **指纹轮换**：每次尝试重新挑选指纹，可选附加 Referer
//! 3. **限流处理**：429 / 503 按指数退避重试
//! 4. **网络重试**：没有拿到响应时同样按指数退避重试
//!
//! 其他非 2xx 状态码原样返回，由调用方决定是否算错误。
//! 同一次调用内的尝试严格串行。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::infrastructure::fingerprint::FingerprintRotator;
use crate::infrastructure::http_transport::{HttpResponse, HttpTransport, TransportError};
use crate::infrastructure::retry::RetryPolicy;

/// 单次抓取的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub referer: Option<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            referer: None,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl FetchOptions {
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

/// 抓取能力，条目处理流程只依赖这个 trait
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<HttpResponse, FetchError>;
}

/// 弹性抓取客户端
pub struct FetchClient {
    transport: Arc<dyn HttpTransport>,
    rotator: FingerprintRotator,
    warmup_delay: Duration,
    defaults: FetchOptions,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            rotator: FingerprintRotator::new(),
            warmup_delay: Duration::from_millis(500),
            defaults: FetchOptions::default(),
        }
    }

    /// 按配置创建，使用 reqwest 传输
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let transport =
            crate::infrastructure::http_transport::ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(Arc::new(transport))
            .with_warmup_delay(config.warmup_delay())
            .with_defaults(FetchOptions {
                referer: None,
                max_retries: config.fetch_max_retries,
                retry_delay: config.retry_delay(),
            }))
    }

    pub fn with_rotator(mut self, rotator: FingerprintRotator) -> Self {
        self.rotator = rotator;
        self
    }

    pub fn with_warmup_delay(mut self, warmup_delay: Duration) -> Self {
        self.warmup_delay = warmup_delay;
        self
    }

    pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &FetchOptions {
        &self.defaults
    }

    /// 抓取一个 URL
    ///
    /// # 返回
    /// - 2xx：直接返回
    /// - 429 / 503：退避后重试，用尽次数后返回 `FetchError::RateLimited`
    /// - 其他状态码：原样返回，不重试
    /// - 网络失败：退避后重试，用尽次数后返回最后一次的错误
    pub async fn fetch_with(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<HttpResponse, FetchError> {
        if reqwest::Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let policy = options.retry_policy();

        if !self.warmup_delay.is_zero() {
            sleep(self.warmup_delay).await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let fingerprint = FingerprintRotator::with_referer(
                &self.rotator.next_profile(),
                options.referer.as_deref(),
            );
            debug!(
                "抓取 {} (尝试 {}/{}, 指纹: {})",
                url, attempt, policy.max_attempts, fingerprint.name
            );

            let failure = match self.transport.get(url, &fingerprint).await {
                Ok(response) if response.is_rate_limited() => {
                    warn!(
                        "⚠️ 请求被限流 {} (状态码 {}, Retry-After: {:?}, 尝试 {}/{})",
                        url, response.status, response.retry_after, attempt, policy.max_attempts
                    );
                    FetchError::RateLimited {
                        attempts: attempt,
                        status: response.status,
                    }
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "⚠️ 网络请求失败 {}: {} (尝试 {}/{})",
                        url, err, attempt, policy.max_attempts
                    );
                    FetchError::Network {
                        attempts: attempt,
                        message: err.message,
                    }
                }
            };

            if !policy.should_retry(attempt) {
                return Err(failure);
            }

            let delay = policy.backoff_delay(attempt);
            debug!("等待 {:?} 后重试 {}", delay, url);
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<HttpResponse, FetchError> {
        let mut options = self.defaults.clone();
        if let Some(referer) = referer {
            options.referer = Some(referer.to_string());
        }
        self.fetch_with(url, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fingerprint::Fingerprint;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 按脚本依次返回结果的传输层
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, &'static str>>>,
        calls: Mutex<Vec<(Instant, Fingerprint)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            fingerprint: &Fingerprint,
        ) -> Result<HttpResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), fingerprint.clone()));
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(200));
            match next {
                Ok(status) => Ok(HttpResponse {
                    status,
                    final_url: url.to_string(),
                    content_type: Some("text/html".to_string()),
                    retry_after: None,
                    body: "<html></html>".to_string(),
                }),
                Err(message) => Err(TransportError::new(message)),
            }
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> FetchClient {
        FetchClient::new(transport).with_rotator(FingerprintRotator::seeded(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_network_failure_exhausts_three_attempts() {
        let transport = ScriptedTransport::new(vec![Err("connection reset"); 5]);
        let client = client(transport.clone());

        let start = Instant::now();
        let result = client.fetch_with("https://example.com", &FetchOptions::default()).await;

        match result {
            Err(FetchError::Network { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert_eq!(message, "connection reset");
            }
            other => panic!("期望网络错误，实际: {:?}", other),
        }
        assert_eq!(transport.call_count(), 3);

        let times = transport.call_times();
        assert_eq!(times[0] - start, Duration::from_millis(500));
        assert_eq!(times[1] - times[0], Duration::from_millis(500));
        assert_eq!(times[2] - times[1], Duration::from_millis(1000));
        assert_eq!(times[2] - times[0], Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let transport = ScriptedTransport::new(vec![Ok(429), Ok(429), Ok(200)]);
        let client = client(transport.clone());

        let response = client
            .fetch_with("https://example.com", &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_surfaces_rate_limited() {
        let transport = ScriptedTransport::new(vec![Ok(503), Ok(429), Ok(503)]);
        let client = client(transport.clone());

        let result = client.fetch_with("https://example.com", &FetchOptions::default()).await;
        assert!(matches!(
            result,
            Err(FetchError::RateLimited { attempts: 3, status: 503 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_status_is_returned_without_retry() {
        let transport = ScriptedTransport::new(vec![Ok(404), Ok(200)]);
        let client = client(transport.clone());

        let response = client
            .fetch_with("https://example.com", &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_applies_to_first_call() {
        let transport = ScriptedTransport::new(vec![Ok(200)]);
        let client = client(transport.clone());

        let start = Instant::now();
        client
            .fetch_with("https://example.com", &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(transport.call_times()[0] - start, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_referer_attached_to_every_attempt() {
        let transport = ScriptedTransport::new(vec![Err("reset"), Ok(200)]);
        let client = client(transport.clone());

        client
            .fetch("https://example.com/page", Some("https://example.com/"))
            .await
            .unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for (_, fingerprint) in calls.iter() {
            assert_eq!(fingerprint.header("Referer"), Some("https://example.com/"));
            assert!(fingerprint.user_agent().is_some());
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone()).with_warmup_delay(Duration::ZERO);

        let result = client.fetch_with("not a url", &FetchOptions::default()).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert_eq!(transport.call_count(), 0);
    }
}
