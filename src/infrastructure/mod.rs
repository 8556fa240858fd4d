//! 基础设施层（Infrastructure）
//!
//! 持有网络资源，只暴露"抓取一个 URL"的能力，不认识任务和条目

pub mod fetch_client;
pub mod fingerprint;
pub mod http_transport;
pub mod retry;

pub use fetch_client::{FetchClient, FetchOptions, PageFetcher};
pub use fingerprint::{Fingerprint, FingerprintRotator};
pub use http_transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use retry::RetryPolicy;
