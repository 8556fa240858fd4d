use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::item::{BatchItem, ItemStatus};
use crate::models::request::Operation;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// 终态之后任务不可再变
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 任务选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    pub max_workers: usize,
    pub retry_failed: bool,
    pub stop_on_error: bool,
    pub create_datasets: bool,
    /// 条目级别的最大整体重试次数，仅在 `retry_failed` 时生效
    pub item_retry_limit: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: 5,
            retry_failed: false,
            stop_on_error: false,
            create_datasets: false,
            item_retry_limit: 1,
        }
    }
}

/// 批处理任务
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub job_id: String,
    #[serde(flatten)]
    pub operation: Operation,
    pub status: JobStatus,
    pub items: Vec<BatchItem>,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub options: BatchOptions,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 预计剩余时间（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    /// 已收到取消请求，等待在途条目完成
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
}

impl BatchJob {
    pub fn new(
        job_id: String,
        operation: Operation,
        options: BatchOptions,
        items: Vec<BatchItem>,
    ) -> Self {
        Self {
            job_id,
            operation,
            status: JobStatus::Queued,
            total: items.len(),
            items,
            processed: 0,
            succeeded: 0,
            failed: 0,
            options,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_time_remaining: None,
            cancel_requested: false,
            dataset_id: None,
        }
    }

    /// 当前处于 processing 的条目数
    pub fn in_flight(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Processing)
            .count()
    }

    pub fn pending(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .count()
    }

    /// 计数器与条目终态是否一致
    pub fn counters_consistent(&self) -> bool {
        let succeeded = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Success)
            .count();
        let failed = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Error)
            .count();
        self.succeeded == succeeded
            && self.failed == failed
            && self.succeeded + self.failed == self.processed
            && self.processed <= self.total
    }

    /// `(elapsed / processed) * (total - processed)`，尚无完成条目时为 None
    pub fn estimate_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.processed == 0 || self.status.is_terminal() {
            return None;
        }
        let started = self.started_at?;
        let elapsed = (now - started).num_milliseconds().max(0) as u64;
        let remaining = (self.total - self.processed) as u64;
        Some(elapsed * remaining / self.processed as u64)
    }

    /// 生成只读快照
    pub fn snapshot(&self, now: DateTime<Utc>) -> BatchJob {
        let mut snapshot = self.clone();
        snapshot.estimated_time_remaining = self.estimate_remaining(now);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemKind;
    use chrono::Duration;

    fn job_with(total: usize) -> BatchJob {
        let items = (0..total)
            .map(|i| BatchItem::new(format!("item-{}", i + 1), ItemKind::Url, "https://example.com"))
            .collect();
        BatchJob::new(
            "job".to_string(),
            Operation::ScrapeMetadata {},
            BatchOptions::default(),
            items,
        )
    }

    #[test]
    fn test_estimate_undefined_until_first_completion() {
        let mut job = job_with(4);
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        assert_eq!(job.estimate_remaining(Utc::now()), None);
    }

    #[test]
    fn test_estimate_uses_average_per_item() {
        let mut job = job_with(4);
        let start = Utc::now();
        job.status = JobStatus::Processing;
        job.started_at = Some(start);
        job.processed = 1;
        job.succeeded = 1;

        let eta = job.estimate_remaining(start + Duration::seconds(2));
        assert_eq!(eta, Some(6000));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
