use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 错误分类
///
/// 每个条目的失败都会归入其中一类，`Fatal` 只出现在提交阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 传输层失败（DNS、连接重置、超时）
    Network,
    /// HTTP 429 / 503
    RateLimited,
    /// 其他非 2xx 状态码
    HttpError,
    /// 内容分析服务失败
    #[serde(rename = "processing_error")]
    Processing,
    /// 请求本身不合法，提交时直接拒绝
    Fatal,
}

impl ErrorKind {
    /// 是否允许在条目级别整体重试
    pub fn is_item_retryable(self) -> bool {
        !matches!(self, ErrorKind::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::HttpError => "http_error",
            ErrorKind::Processing => "processing_error",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 条目级别的错误，写入 `BatchItem::error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{kind}] {message}")]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn http_status(status: u16, url: &str) -> Self {
        Self::new(ErrorKind::HttpError, format!("HTTP {} ({})", status, url))
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Processing, message)
    }
}

/// 抓取客户端错误
#[derive(Debug, Error)]
pub enum FetchError {
    /// 网络请求失败（已用尽重试次数）
    #[error("网络请求失败 (尝试 {attempts} 次): {message}")]
    Network { attempts: u32, message: String },

    /// 持续被限流（已用尽重试次数）
    #[error("请求被限流 (尝试 {attempts} 次, 最后状态码: {status})")]
    RateLimited { attempts: u32, status: u16 },

    /// URL 无法解析
    #[error("无效的 URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network { .. } | FetchError::InvalidUrl { .. } => ErrorKind::Network,
            FetchError::RateLimited { .. } => ErrorKind::RateLimited,
        }
    }
}

impl From<FetchError> for ItemError {
    fn from(err: FetchError) -> Self {
        ItemError::new(err.kind(), err.to_string())
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum BatchError {
    /// 提交的请求不合法（fatal）
    #[error("无效的批处理请求: {0}")]
    InvalidRequest(String),

    /// 任务不存在
    #[error("任务不存在: {job_id}")]
    JobNotFound { job_id: String },

    /// 持久化服务错误
    #[error("存储错误: {0}")]
    Store(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML解析失败: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl BatchError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        BatchError::InvalidRequest(msg.into())
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        BatchError::JobNotFound {
            job_id: job_id.into(),
        }
    }

    /// 映射到统一的错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::InvalidRequest(_) | BatchError::Config(_) | BatchError::TomlParse(_) => {
                ErrorKind::Fatal
            }
            _ => ErrorKind::Processing,
        }
    }
}

/// 应用程序结果类型
pub type Result<T, E = BatchError> = std::result::Result<T, E>;
