//! 批处理应用 - 编排层
//!
//! ## 职责
//!
//! 本模块是命令行程序的入口，负责把一个批处理请求从提交跑到结束。
//!
//! ## 核心功能
//!
//! 1. **加载请求**：从 TOML 文件读取 `SubmitRequest`
//! 2. **提交任务**：交给 `BatchService`，不处理单个条目的细节
//! 3. **进度监控**：按固定间隔轮询快照并输出进度和预计剩余时间
//! 4. **中断处理**：收到 Ctrl-C 时发起协作式取消
//! 5. **输出报告**：最终快照以 JSON 写入报告文件，并打印统计

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::job::BatchJob;
use crate::models::request::SubmitRequest;
use crate::orchestrator::batch_service::BatchService;
use crate::utils::logging::{log_progress, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    service: BatchService,
}

impl App {
    /// 使用默认组件初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        let service = BatchService::from_config(config.clone()).context("初始化批处理服务失败")?;
        Ok(Self::with_service(config, service))
    }

    pub fn with_service(config: Config, service: BatchService) -> Self {
        Self { config, service }
    }

    pub fn service(&self) -> &BatchService {
        &self.service
    }

    /// 运行应用主逻辑：读取请求文件并处理
    pub async fn run(&self) -> Result<BatchJob> {
        log_startup(&self.config);
        let request = self.load_request().await?;
        self.run_request(request).await
    }

    /// 提交请求并监控到任务结束
    pub async fn run_request(&self, request: SubmitRequest) -> Result<BatchJob> {
        let response = self.service.submit(request).await.context("提交任务失败")?;
        info!(
            "✓ 任务已提交: {} ({}, 共 {} 个条目)",
            response.job_id, response.status, response.total
        );

        let job = self.supervise(&response.job_id).await?;

        self.write_report(&job).await?;
        print_final_stats(&job, &self.config.report_file);

        Ok(job)
    }

    async fn load_request(&self) -> Result<SubmitRequest> {
        info!("\n📁 正在读取批处理请求...");
        let request = crate::models::load_toml_to_request(Path::new(&self.config.request_file))
            .await
            .with_context(|| format!("读取请求文件失败: {}", self.config.request_file))?;
        Ok(request)
    }

    /// 轮询任务进度，Ctrl-C 时取消任务并等待排空
    async fn supervise(&self, job_id: &str) -> Result<BatchJob> {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut cancelling = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let job = self.service.get_snapshot(job_id).await?;
                    log_progress(&job);
                    if job.status.is_terminal() {
                        return Ok(job);
                    }
                }
                signal = &mut ctrl_c, if !cancelling => {
                    cancelling = true;
                    if let Err(e) = signal {
                        warn!("⚠️ 监听 Ctrl-C 失败: {}", e);
                        continue;
                    }
                    warn!("🛑 收到 Ctrl-C，正在取消任务，等待处理中的条目完成...");
                    let status = self.service.cancel(job_id).await?;
                    info!("任务状态: {}", status);
                }
            }
        }
    }

    async fn write_report(&self, job: &BatchJob) -> Result<()> {
        let report = serde_json::to_string_pretty(job).context("序列化报告失败")?;
        tokio::fs::write(&self.config.report_file, report)
            .await
            .with_context(|| format!("写入报告失败: {}", self.config.report_file))?;
        Ok(())
    }
}
