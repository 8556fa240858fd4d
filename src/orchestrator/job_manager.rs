//! 任务管理器 - 编排层
//!
//! 一个 `JobManager` 只管理一个任务的生命周期：
//!
//! ```text
//! queued ──start──▶ processing ◀──resume── paused
//!   │                 │    │  └───pause───▶   │
//!   │ cancel          │    │ 排空             │ cancel（排空后）
//!   ▼                 ▼    ▼                  ▼
//! cancelled      completed  failed        cancelled
//! ```
//!
//! 状态修改都在任务锁内完成，调度器通过 watch 通道接收控制信号。
//! 对终态任务的 pause/resume/cancel 都是空操作。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::models::item::ItemStatus;
use crate::models::job::{BatchJob, JobStatus};
use crate::orchestrator::scheduler::{persist_job, JobControl, ScheduleOutcome, Scheduler};
use crate::services::JobStore;
use crate::utils::logging::short_id;
use crate::workflow::ItemProcessor;

/// 单个任务的管理器
pub struct JobManager {
    job: Arc<Mutex<BatchJob>>,
    control: watch::Sender<JobControl>,
    finished: watch::Sender<bool>,
    processor: Arc<ItemProcessor>,
    store: Arc<dyn JobStore>,
}

impl JobManager {
    pub fn new(job: BatchJob, processor: Arc<ItemProcessor>, store: Arc<dyn JobStore>) -> Arc<Self> {
        let (control, _) = watch::channel(JobControl::Running);
        let (finished, _) = watch::channel(false);
        Arc::new(Self {
            job: Arc::new(Mutex::new(job)),
            control,
            finished,
            processor,
            store,
        })
    }

    /// `queued → processing`，在后台启动调度器
    ///
    /// 非 queued 状态下调用是空操作
    pub async fn start(self: &Arc<Self>) -> JobStatus {
        let snapshot = {
            let mut job = self.job.lock().await;
            if job.status != JobStatus::Queued {
                return job.status;
            }
            let now = Utc::now();
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            for item in job.items.iter_mut() {
                item.status = ItemStatus::Pending;
            }
            info!(
                "[任务 {}] 🚀 开始处理: {} 个条目, 操作 {}, 并发 {}",
                short_id(&job.job_id),
                job.total,
                job.operation,
                job.options.max_workers
            );
            job.snapshot(now)
        };
        persist_job(self.store.as_ref(), &snapshot).await;

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run().await;
        });

        JobStatus::Processing
    }

    async fn run(&self) {
        let scheduler = Scheduler::new(
            Arc::clone(&self.job),
            self.control.subscribe(),
            Arc::clone(&self.processor),
            Arc::clone(&self.store),
        );
        let outcome = scheduler.run().await;

        let dataset_id = self.create_dataset().await;

        let snapshot = {
            let mut job = self.job.lock().await;
            let now = Utc::now();
            job.status = final_status(outcome);
            job.completed_at = Some(now);
            job.estimated_time_remaining = None;
            job.cancel_requested = false;
            if dataset_id.is_some() {
                job.dataset_id = dataset_id;
            }

            let emoji = match job.status {
                JobStatus::Completed => "✅",
                JobStatus::Failed => "❌",
                _ => "🛑",
            };
            info!(
                "[任务 {}] {} 任务结束: {} (成功 {}, 失败 {}, 已处理 {}/{})",
                short_id(&job.job_id),
                emoji,
                job.status,
                job.succeeded,
                job.failed,
                job.processed,
                job.total
            );
            job.snapshot(now)
        };

        persist_job(self.store.as_ref(), &snapshot).await;
        self.finished.send_replace(true);
    }

    /// `createDatasets` 时把成功结果存成数据集，失败只记日志
    async fn create_dataset(&self) -> Option<String> {
        let (job_id, results) = {
            let job = self.job.lock().await;
            if !job.options.create_datasets {
                return None;
            }
            let results: Vec<_> = job
                .items
                .iter()
                .filter_map(|item| item.result.clone())
                .collect();
            (job.job_id.clone(), results)
        };

        if results.is_empty() {
            info!("[任务 {}] 没有成功的条目，跳过数据集创建", short_id(&job_id));
            return None;
        }

        let count = results.len();
        match self.store.save_dataset(&job_id, results).await {
            Ok(dataset_id) => {
                info!(
                    "[任务 {}] 💾 已创建数据集 {} ({} 条结果)",
                    short_id(&job_id),
                    dataset_id,
                    count
                );
                Some(dataset_id)
            }
            Err(e) => {
                warn!("[任务 {}] ⚠️ 创建数据集失败: {:#}", short_id(&job_id), e);
                None
            }
        }
    }

    /// 只读快照
    pub async fn snapshot(&self) -> BatchJob {
        self.job.lock().await.snapshot(Utc::now())
    }

    /// `processing → paused`
    pub async fn pause(&self) -> JobStatus {
        self.transition(|job| {
            if job.status == JobStatus::Processing && !job.cancel_requested {
                job.status = JobStatus::Paused;
                Some(JobControl::Paused)
            } else {
                None
            }
        })
        .await
    }

    /// `paused → processing`
    pub async fn resume(&self) -> JobStatus {
        self.transition(|job| {
            if job.status == JobStatus::Paused && !job.cancel_requested {
                job.status = JobStatus::Processing;
                Some(JobControl::Running)
            } else {
                None
            }
        })
        .await
    }

    /// 协作式取消
    ///
    /// queued 任务立即进入 cancelled；processing/paused 任务停止派发，
    /// 在途条目完成后进入 cancelled
    pub async fn cancel(&self) -> JobStatus {
        let status = self
            .transition(|job| {
                if job.status.is_terminal() || job.cancel_requested {
                    return None;
                }
                if job.status == JobStatus::Queued {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(Utc::now());
                } else {
                    job.cancel_requested = true;
                }
                Some(JobControl::Cancelled)
            })
            .await;

        if status == JobStatus::Cancelled {
            self.finished.send_replace(true);
        }
        status
    }

    /// 等待任务进入终态，返回最终快照
    pub async fn wait(&self) -> BatchJob {
        let mut finished = self.finished.subscribe();
        if finished.wait_for(|done| *done).await.is_err() {
            warn!("任务完成信号已关闭");
        }
        self.snapshot().await
    }

    /// 在任务锁内执行状态转换，成功时发送控制信号并持久化
    async fn transition<F>(&self, apply: F) -> JobStatus
    where
        F: FnOnce(&mut BatchJob) -> Option<JobControl>,
    {
        let (status, snapshot) = {
            let mut job = self.job.lock().await;
            let before = job.status;
            match apply(&mut job) {
                Some(control) => {
                    self.control.send_replace(control);
                    info!(
                        "[任务 {}] 🔁 {} → {} ({:?})",
                        short_id(&job.job_id),
                        before,
                        job.status,
                        control
                    );
                    (job.status, Some(job.snapshot(Utc::now())))
                }
                None => (job.status, None),
            }
        };

        if let Some(snapshot) = snapshot {
            persist_job(self.store.as_ref(), &snapshot).await;
        }
        status
    }
}

/// 调度结束后的任务终态
///
/// 只看调度器实际观察到的情况：调度器返回之后才到达的取消请求，
/// 不会把所有条目都已终结的任务改成 cancelled
fn final_status(outcome: ScheduleOutcome) -> JobStatus {
    if outcome.cancelled {
        JobStatus::Cancelled
    } else if outcome.stopped_on_error {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FetchError};
    use crate::infrastructure::{HttpResponse, PageFetcher};
    use crate::models::item::{BatchItem, ItemKind};
    use crate::models::job::BatchOptions;
    use crate::models::request::Operation;
    use crate::services::{ContentAnalyzer, InMemoryJobStore, RawContent};
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;

    /// 每次抓取耗时 `delay`，URL 包含 "fail" 时返回 500
    struct SlowFetcher {
        delay: Duration,
    }

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, url: &str, _referer: Option<&str>) -> Result<HttpResponse, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(HttpResponse {
                status: if url.contains("fail") { 500 } else { 200 },
                final_url: url.to_string(),
                content_type: None,
                retry_after: None,
                body: "ok".to_string(),
            })
        }
    }

    struct EchoAnalyzer;

    #[async_trait]
    impl ContentAnalyzer for EchoAnalyzer {
        async fn analyze(
            &self,
            _operation: &Operation,
            item: &BatchItem,
            _content: &RawContent,
        ) -> anyhow::Result<JsonValue> {
            Ok(json!({ "id": item.id }))
        }
    }

    fn manager(urls: &[&str], options: BatchOptions) -> (Arc<JobManager>, Arc<InMemoryJobStore>) {
        let items = urls
            .iter()
            .enumerate()
            .map(|(i, url)| BatchItem::new(format!("item-{}", i + 1), ItemKind::Url, *url))
            .collect();
        let job = BatchJob::new(
            "job-under-test".to_string(),
            Operation::ScrapeMetadata {},
            options,
            items,
        );
        let processor = Arc::new(ItemProcessor::new(
            Arc::new(SlowFetcher {
                delay: Duration::from_millis(100),
            }),
            Arc::new(EchoAnalyzer),
        ));
        let store = Arc::new(InMemoryJobStore::new());
        (JobManager::new(job, processor, store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_cancel_is_immediate() {
        let (manager, _) = manager(&["https://a.example"], BatchOptions::default());

        assert_eq!(manager.pause().await, JobStatus::Queued);
        assert_eq!(manager.cancel().await, JobStatus::Cancelled);
        assert_eq!(manager.start().await, JobStatus::Cancelled);

        let job = manager.wait().await;
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_and_terminal_noops() {
        let (manager, store) = manager(
            &["https://a.example", "https://b.example", "https://c.example"],
            BatchOptions {
                max_workers: 1,
                ..BatchOptions::default()
            },
        );

        manager.start().await;
        assert_eq!(manager.resume().await, JobStatus::Processing);
        assert_eq!(manager.pause().await, JobStatus::Paused);
        assert_eq!(manager.pause().await, JobStatus::Paused);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let paused = manager.snapshot().await;
        assert_eq!(paused.status, JobStatus::Paused);
        assert!(paused.processed <= 1);
        assert_eq!(paused.in_flight(), 0);

        let mut waiter = tokio_test::task::spawn(manager.wait());
        tokio_test::assert_pending!(waiter.poll());
        drop(waiter);

        assert_eq!(manager.resume().await, JobStatus::Processing);
        let job = manager.wait().await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.succeeded, 3);
        assert!(job.counters_consistent());

        assert_eq!(manager.pause().await, JobStatus::Completed);
        assert_eq!(manager.resume().await, JobStatus::Completed);
        assert_eq!(manager.cancel().await, JobStatus::Completed);

        let stored = store.load_job("job-under-test").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drains_in_flight_items() {
        let urls: Vec<String> = (0..6).map(|i| format!("https://{}.example", i)).collect();
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
        let (manager, _) = manager(
            &urls,
            BatchOptions {
                max_workers: 2,
                ..BatchOptions::default()
            },
        );

        manager.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = manager.cancel().await;
        assert!(!status.is_terminal() || status == JobStatus::Cancelled);
        assert_eq!(manager.cancel().await, status);
        assert_eq!(manager.resume().await, status);

        let job = manager.wait().await;
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(!job.cancel_requested);
        assert_eq!(job.processed, 2);
        assert_eq!(job.pending(), 4);
        assert!(job.counters_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_requeues_once() {
        let (manager, _) = manager(
            &["https://ok.example", "https://fail.example"],
            BatchOptions {
                max_workers: 1,
                retry_failed: true,
                ..BatchOptions::default()
            },
        );

        manager.start().await;
        let job = manager.wait().await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items[1].attempts, 2);
        assert_eq!(job.items[1].status, ItemStatus::Error);
        assert_eq!(
            job.items[1].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::HttpError)
        );
        assert_eq!(job.processed, 2);
        assert_eq!(job.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dataset_created_from_successes() {
        let (manager, store) = manager(
            &["https://ok.example", "https://fail.example"],
            BatchOptions {
                create_datasets: true,
                ..BatchOptions::default()
            },
        );

        manager.start().await;
        let job = manager.wait().await;

        let dataset_id = job.dataset_id.expect("应当生成数据集");
        let dataset = store.dataset(&dataset_id).await.unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset[0].data["id"], "item-1");
    }

    #[test]
    fn test_final_status_ignores_cancel_after_scheduler_returns() {
        assert_eq!(final_status(ScheduleOutcome::default()), JobStatus::Completed);
        assert_eq!(
            final_status(ScheduleOutcome {
                stopped_on_error: true,
                cancelled: false,
            }),
            JobStatus::Failed
        );
        assert_eq!(
            final_status(ScheduleOutcome {
                stopped_on_error: true,
                cancelled: true,
            }),
            JobStatus::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_cancel_flag_keeps_completed_status() {
        let (manager, _) = manager(&["https://a.example"], BatchOptions::default());
        manager.start().await;

        // 条目都已终结后才置上取消标记，调度器不会再看到取消信号
        loop {
            let mut job = manager.job.lock().await;
            if job.processed == job.total {
                if !job.status.is_terminal() {
                    job.cancel_requested = true;
                }
                break;
            }
            drop(job);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let job = manager.wait().await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.cancel_requested);
        assert_eq!(job.succeeded, 1);
    }
}
