//! 任务持久化服务 - 业务能力层
//!
//! 外部存储只被当作键值存储使用：
//! - 任务记录按 `jobId` 覆盖写入
//! - 条目记录按 `(jobId, itemId)` 覆盖写入
//! - 数据集写入后返回一个新的数据集 ID

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::item::{BatchItem, ItemResult};
use crate::models::job::BatchJob;

/// 持久化能力
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(&self, job: &BatchJob) -> Result<()>;

    async fn save_item(&self, job_id: &str, item: &BatchItem) -> Result<()>;

    async fn load_job(&self, job_id: &str) -> Result<Option<BatchJob>>;

    /// 保存成功条目的结果，返回数据集 ID
    async fn save_dataset(&self, job_id: &str, results: Vec<ItemResult>) -> Result<String>;
}

/// 进程内存储，没有外部存储时使用
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, BatchJob>>,
    items: RwLock<HashMap<(String, String), BatchItem>>,
    datasets: RwLock<HashMap<String, Vec<ItemResult>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn item(&self, job_id: &str, item_id: &str) -> Option<BatchItem> {
        self.items
            .read()
            .await
            .get(&(job_id.to_string(), item_id.to_string()))
            .cloned()
    }

    pub async fn dataset(&self, dataset_id: &str) -> Option<Vec<ItemResult>> {
        self.datasets.read().await.get(dataset_id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_job(&self, job: &BatchJob) -> Result<()> {
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn save_item(&self, job_id: &str, item: &BatchItem) -> Result<()> {
        self.items
            .write()
            .await
            .insert((job_id.to_string(), item.id.clone()), item.clone());
        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<BatchJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn save_dataset(&self, job_id: &str, results: Vec<ItemResult>) -> Result<String> {
        let dataset_id = format!("dataset-{}", uuid::Uuid::new_v4());
        debug!(
            "任务 {} 保存数据集 {} ({} 条结果)",
            job_id,
            dataset_id,
            results.len()
        );
        self.datasets
            .write()
            .await
            .insert(dataset_id.clone(), results);
        Ok(dataset_id)
    }
}
