//! 批处理服务 - 编排层
//!
//! 对外的提交/查询/控制入口，持有所有任务的 `JobManager`。
//! 不同任务之间不共享任何可变状态。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{BatchError, Result};
use crate::infrastructure::FetchClient;
use crate::models::job::{BatchJob, JobStatus};
use crate::models::request::{SubmitRequest, SubmitResponse};
use crate::orchestrator::job_manager::JobManager;
use crate::orchestrator::scheduler::persist_job;
use crate::services::{InMemoryJobStore, JobStore, MetadataAnalyzer};
use crate::utils::logging::short_id;
use crate::workflow::ItemProcessor;

/// 批处理服务
pub struct BatchService {
    config: Config,
    processor: Arc<ItemProcessor>,
    store: Arc<dyn JobStore>,
    jobs: RwLock<HashMap<String, Arc<JobManager>>>,
}

impl BatchService {
    pub fn new(config: Config, processor: Arc<ItemProcessor>, store: Arc<dyn JobStore>) -> Self {
        Self {
            config,
            processor,
            store,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// 使用默认组件创建：reqwest 抓取 + 内置元信息分析 + 进程内存储
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = FetchClient::from_config(&config)
            .map_err(|e| BatchError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;
        let analyzer = MetadataAnalyzer::new()
            .map_err(|e| BatchError::Config(format!("创建分析器失败: {}", e)))?;
        let processor = ItemProcessor::from_config(&config, Arc::new(fetcher), Arc::new(analyzer));

        Ok(Self::new(
            config,
            Arc::new(processor),
            Arc::new(InMemoryJobStore::new()),
        ))
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// 提交任务
    ///
    /// 请求不合法时同步返回 fatal 错误，不会创建任务
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        let (options, items) = request.validate(self.config.max_workers)?;

        let job_id = Uuid::new_v4().to_string();
        let job = BatchJob::new(job_id.clone(), request.operation, options, items);
        let total = job.total;
        let operation = job.operation.to_string();

        persist_job(self.store.as_ref(), &job).await;

        let manager = JobManager::new(job, Arc::clone(&self.processor), Arc::clone(&self.store));
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), Arc::clone(&manager));

        info!(
            "[任务 {}] 📥 已提交: {} 个条目, 操作 {}",
            short_id(&job_id),
            total,
            operation
        );

        manager.start().await;

        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
            total,
            message: format!("已提交 {} 个条目", total),
        })
    }

    async fn manager(&self, job_id: &str) -> Result<Arc<JobManager>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| BatchError::job_not_found(job_id))
    }

    /// 任务快照；本进程没有该任务时回退到存储中的记录
    pub async fn get_snapshot(&self, job_id: &str) -> Result<BatchJob> {
        if let Ok(manager) = self.manager(job_id).await {
            return Ok(manager.snapshot().await);
        }

        debug!("任务 {} 不在内存中，查询存储", job_id);
        self.store
            .load_job(job_id)
            .await
            .map_err(|e| BatchError::Store(format!("{:#}", e)))?
            .ok_or_else(|| BatchError::job_not_found(job_id))
    }

    pub async fn pause(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.manager(job_id).await?.pause().await)
    }

    pub async fn resume(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.manager(job_id).await?.resume().await)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.manager(job_id).await?.cancel().await)
    }

    /// 等待任务进入终态
    pub async fn wait(&self, job_id: &str) -> Result<BatchJob> {
        Ok(self.manager(job_id).await?.wait().await)
    }

    pub async fn job_ids(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }
}
