//! 条目处理上下文
//!
//! 封装"我正在处理哪个任务的第几个条目"这一信息

use std::fmt::Display;

use crate::utils::logging::short_id;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 任务ID
    pub job_id: String,

    /// 条目在任务中的索引（从1开始，仅用于日志显示）
    pub item_index: usize,

    /// 条目ID
    pub item_id: String,

    /// 第几次整体派发
    pub attempt: u32,
}

impl ItemCtx {
    pub fn new(job_id: String, item_index: usize, item_id: String, attempt: u32) -> Self {
        Self {
            job_id,
            item_index,
            item_id,
            attempt,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} 条目 {}#{}]",
            short_id(&self.job_id),
            self.item_index,
            self.item_id
        )?;
        if self.attempt > 1 {
            write!(f, "(第 {} 次)", self.attempt)?;
        }
        Ok(())
    }
}
