//! HTTP 传输 - 基础设施层
//!
//! 只负责"发一次请求"，重试和限流判断都在 `FetchClient` 中

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::infrastructure::fingerprint::Fingerprint;

/// 一次请求的响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub retry_after: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 / 503 视为限流
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status, 429 | 503)
    }
}

/// 传输层失败（没有拿到响应）
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("请求超时: {}", err)
        } else if err.is_connect() {
            format!("连接失败: {}", err)
        } else {
            err.to_string()
        };
        TransportError::new(message)
    }
}

/// 单次 HTTP GET
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<HttpResponse, TransportError>;
}

/// 基于 reqwest 的传输实现
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        for (key, value) in &fingerprint.headers {
            request = request.header(*key, value.as_str());
        }

        debug!("GET {} (指纹: {})", url, fingerprint.name);

        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let header_value = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let content_type = header_value(reqwest::header::CONTENT_TYPE);
        let retry_after = header_value(reqwest::header::RETRY_AFTER);
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            final_url,
            content_type,
            retry_after,
            body,
        })
    }
}
