//! 工作池调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **FIFO 派发**：按提交顺序从队列取出 pending 条目
//! 2. **并发控制**：使用 Semaphore 限制同时处理的条目数
//! 3. **结果回写**：在任务锁内更新条目状态和计数器
//! 4. **条目级重试**：`retryFailed` 时把失败条目放回队尾
//! 5. **控制信号**：暂停时停止派发，取消或 stop-on-error 时排空后退出
//!
//! 调度器只负责把队列跑完，任务的最终状态由 `JobManager` 决定。

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::ItemError;
use crate::models::item::{BatchItem, ItemResult, ItemStatus};
use crate::models::job::BatchJob;
use crate::services::JobStore;
use crate::utils::logging::short_id;
use crate::workflow::{ItemCtx, ItemProcessor};

/// 任务控制信号，由 `JobManager` 写入，调度器读取
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControl {
    Running,
    Paused,
    Cancelled,
}

/// 调度结束时的情况
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// stop-on-error 是否被触发
    pub stopped_on_error: bool,
    /// 是否因为取消而提前结束
    pub cancelled: bool,
}

/// 条目下标、处理结果，以及占用的工作槽位
///
/// 槽位在结果回写之后才释放，processing 条目数因此不会超过 `maxWorkers`
type ItemOutcome = (usize, Result<ItemResult, ItemError>, OwnedSemaphorePermit);

/// 工作池调度器，每个任务一个
pub struct Scheduler {
    job: Arc<Mutex<BatchJob>>,
    control: watch::Receiver<JobControl>,
    processor: Arc<ItemProcessor>,
    store: Arc<dyn JobStore>,
}

impl Scheduler {
    pub fn new(
        job: Arc<Mutex<BatchJob>>,
        control: watch::Receiver<JobControl>,
        processor: Arc<ItemProcessor>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            job,
            control,
            processor,
            store,
        }
    }

    /// 运行到队列为空且没有在途条目，或被取消/stop-on-error 打断后排空
    pub async fn run(mut self) -> ScheduleOutcome {
        let (job_id, operation, options, mut queue) = {
            let job = self.job.lock().await;
            let queue: VecDeque<usize> = job
                .items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.status == ItemStatus::Pending)
                .map(|(idx, _)| idx)
                .collect();
            (
                job.job_id.clone(),
                job.operation.clone(),
                job.options.clone(),
                queue,
            )
        };

        let semaphore = Arc::new(Semaphore::new(options.max_workers));
        let mut tasks: JoinSet<ItemOutcome> = JoinSet::new();
        let mut outcome = ScheduleOutcome::default();
        let mut control_open = true;

        loop {
            let control = *self.control.borrow();
            if control == JobControl::Cancelled {
                outcome.cancelled = true;
            }

            let may_dispatch =
                control == JobControl::Running && !outcome.stopped_on_error && !queue.is_empty();

            if may_dispatch {
                if let Ok(permit) = semaphore.clone().try_acquire_owned() {
                    if let Some(idx) = queue.pop_front() {
                        let (item, ctx) = self.begin_item(&job_id, idx).await;
                        let processor = Arc::clone(&self.processor);
                        let operation = operation.clone();

                        tasks.spawn(async move {
                            let worker = tokio::spawn(async move {
                                processor.process(&item, &operation, &ctx).await
                            });
                            let result = worker.await.unwrap_or_else(|e| {
                                Err(ItemError::processing(format!("worker 异常退出: {}", e)))
                            });
                            (idx, result, permit)
                        });
                    }
                    continue;
                }
            }

            if tasks.is_empty() {
                let drained = queue.is_empty()
                    || outcome.stopped_on_error
                    || control == JobControl::Cancelled;
                if drained || !control_open {
                    break;
                }
                // 暂停中：等待控制信号变化
                if self.control.changed().await.is_err() {
                    control_open = false;
                }
                continue;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, result, permit))) => {
                        let retry = self.finish_item(&job_id, idx, result, &mut outcome).await;
                        drop(permit);
                        if retry {
                            queue.push_back(idx);
                        }
                    }
                    Some(Err(e)) => error!("[任务 {}] 调度任务执行失败: {}", short_id(&job_id), e),
                    None => {}
                },
                changed = self.control.changed(), if control_open => {
                    if changed.is_err() {
                        control_open = false;
                    }
                }
            }
        }

        if outcome.cancelled && !queue.is_empty() {
            info!(
                "[任务 {}] 🛑 已取消，{} 个条目未派发",
                short_id(&job_id),
                queue.len()
            );
        }

        outcome
    }

    /// 标记条目进入 processing 并生成上下文
    async fn begin_item(&self, job_id: &str, idx: usize) -> (BatchItem, ItemCtx) {
        let item = {
            let mut job = self.job.lock().await;
            let item = &mut job.items[idx];
            item.mark_processing(Utc::now());
            item.clone()
        };
        persist_item(self.store.as_ref(), job_id, &item).await;

        let ctx = ItemCtx::new(job_id.to_string(), idx + 1, item.id.clone(), item.attempts);
        (item, ctx)
    }

    /// 回写条目结果，返回是否需要放回队尾重试
    async fn finish_item(
        &self,
        job_id: &str,
        idx: usize,
        result: Result<ItemResult, ItemError>,
        outcome: &mut ScheduleOutcome,
    ) -> bool {
        let cancelled = *self.control.borrow() == JobControl::Cancelled;

        let (item, snapshot, retry) = {
            let mut job = self.job.lock().await;
            let options = job.options.clone();
            let now = Utc::now();
            let item = &mut job.items[idx];
            let mut retry = false;

            let succeeded = match result {
                Ok(result) => {
                    item.mark_success(result, now);
                    Some(true)
                }
                Err(err) => {
                    let retries_used = item.attempts.saturating_sub(1);
                    if options.retry_failed
                        && err.kind.is_item_retryable()
                        && retries_used < options.item_retry_limit
                        && !cancelled
                        && !outcome.stopped_on_error
                    {
                        warn!(
                            "[任务 {}] [条目 {}] ⚠️ 失败，放回队尾重试: {}",
                            short_id(job_id),
                            item.id,
                            err
                        );
                        item.mark_retry();
                        retry = true;
                        None
                    } else {
                        warn!(
                            "[任务 {}] [条目 {}] ❌ 处理失败: {}",
                            short_id(job_id),
                            item.id,
                            err
                        );
                        item.mark_error(err, now);
                        Some(false)
                    }
                }
            };
            let item = item.clone();

            match succeeded {
                Some(true) => {
                    job.processed += 1;
                    job.succeeded += 1;
                }
                Some(false) => {
                    job.processed += 1;
                    job.failed += 1;
                    if options.stop_on_error && !outcome.stopped_on_error {
                        outcome.stopped_on_error = true;
                        warn!(
                            "[任务 {}] 🛑 条目 {} 失败，stopOnError 已触发，停止派发",
                            short_id(job_id),
                            item.id
                        );
                    }
                }
                None => {}
            }

            info!(
                "[任务 {}] 📊 进度 {}/{} (成功 {}, 失败 {})",
                short_id(job_id),
                job.processed,
                job.total,
                job.succeeded,
                job.failed
            );

            (item, job.snapshot(now), retry)
        };

        persist_item(self.store.as_ref(), job_id, &item).await;
        persist_job(self.store.as_ref(), &snapshot).await;
        retry
    }
}

/// 写入任务记录，失败只记日志
pub(crate) async fn persist_job(store: &dyn JobStore, job: &BatchJob) {
    if let Err(e) = store.save_job(job).await {
        warn!("[任务 {}] ⚠️ 保存任务记录失败: {:#}", short_id(&job.job_id), e);
    }
}

/// 写入条目记录，失败只记日志
pub(crate) async fn persist_item(store: &dyn JobStore, job_id: &str, item: &BatchItem) {
    if let Err(e) = store.save_item(job_id, item).await {
        warn!(
            "[任务 {}] [条目 {}] ⚠️ 保存条目记录失败: {:#}",
            short_id(job_id),
            item.id,
            e
        );
    }
}
