//! 日志工具模块
//!
//! 提供日志初始化和格式化输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::job::BatchJob;

/// 初始化日志
///
/// 默认 `info`，`verbose` 时为 `debug`，设置了 `RUST_LOG` 时以它为准。
/// 重复调用时保留已有的订阅器，并在 stderr 给出提示。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .try_init();
    if let Err(e) = result {
        eprintln!("日志已初始化，沿用现有配置: {}", e);
    }
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批处理任务模式");
    info!("📊 默认并发数: {}", config.max_workers);
    info!(
        "🔁 抓取重试: 最多 {} 次, 基础延迟 {}ms",
        config.fetch_max_retries, config.fetch_retry_delay_ms
    );
    info!("📄 请求文件: {}", config.request_file);
    info!("{}", "=".repeat(60));
}

/// 记录任务进度
///
/// # 参数
/// - `job`: 任务快照
pub fn log_progress(job: &BatchJob) {
    let eta = job
        .estimated_time_remaining
        .map(format_millis)
        .unwrap_or_else(|| "未知".to_string());
    info!(
        "[任务 {}] ⏳ {} | {}/{} (成功 {}, 失败 {}, 处理中 {}) | 预计剩余 {}",
        short_id(&job.job_id),
        job.status,
        job.processed,
        job.total,
        job.succeeded,
        job.failed,
        job.in_flight(),
        eta
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `job`: 任务最终快照
/// - `report_file`: 报告文件路径
pub fn print_final_stats(job: &BatchJob, report_file: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📌 任务状态: {}", job.status);
    info!("✅ 成功: {}/{}", job.succeeded, job.total);
    info!("❌ 失败: {}", job.failed);
    info!("⏸️ 未处理: {}", job.total - job.processed);
    if let Some(dataset_id) = &job.dataset_id {
        info!("💾 数据集: {}", dataset_id);
    }
    for item in job.items.iter().filter(|item| item.error.is_some()) {
        if let Some(error) = &item.error {
            info!("   - {} {}: {}", item.id, truncate_text(&item.source, 60), error);
        }
    }
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", report_file);
}

/// 任务 ID 的短前缀，日志用
pub fn short_id(job_id: &str) -> &str {
    job_id.get(..8).unwrap_or(job_id)
}

/// 毫秒转成 `1m 05s` 形式
pub fn format_millis(millis: u64) -> String {
    let secs = millis / 1000;
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{}s", secs, (millis % 1000) / 100)
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
