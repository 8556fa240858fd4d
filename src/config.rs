use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 每个任务默认的并发 worker 数（请求未指定时使用）
    pub max_workers: usize,
    // --- 抓取客户端配置 ---
    /// 单次抓取的最大尝试次数
    pub fetch_max_retries: u32,
    /// 重试退避的基础延迟（毫秒）
    pub fetch_retry_delay_ms: u64,
    /// 第一次请求前的预热延迟（毫秒）
    pub fetch_warmup_delay_ms: u64,
    /// 单个 HTTP 请求的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 单个条目处理的总超时时间（秒）
    pub item_timeout_secs: u64,
    // --- 运行配置 ---
    /// 进度轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 批处理请求 TOML 文件
    pub request_file: String,
    /// 最终报告输出文件
    pub report_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 5,
            fetch_max_retries: 3,
            fetch_retry_delay_ms: 500,
            fetch_warmup_delay_ms: 500,
            request_timeout_secs: 30,
            item_timeout_secs: 120,
            poll_interval_ms: 1000,
            request_file: "batch_request.toml".to_string(),
            report_file: "batch_report.json".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_workers: env_parse("MAX_WORKERS").unwrap_or(default.max_workers),
            fetch_max_retries: env_parse("FETCH_MAX_RETRIES").unwrap_or(default.fetch_max_retries),
            fetch_retry_delay_ms: env_parse("FETCH_RETRY_DELAY_MS").unwrap_or(default.fetch_retry_delay_ms),
            fetch_warmup_delay_ms: env_parse("FETCH_WARMUP_DELAY_MS").unwrap_or(default.fetch_warmup_delay_ms),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(default.request_timeout_secs),
            item_timeout_secs: env_parse("ITEM_TIMEOUT_SECS").unwrap_or(default.item_timeout_secs),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(default.poll_interval_ms),
            request_file: std::env::var("REQUEST_FILE").unwrap_or(default.request_file),
            report_file: std::env::var("REPORT_FILE").unwrap_or(default.report_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_warmup_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.fetch_max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.warmup_delay(), Duration::from_millis(500));
        assert!(!config.verbose_logging);
    }
}
