//! 业务能力层（Services）
//!
//! 描述"我能做什么"，每个能力只处理单个条目或单个任务记录：
//! - `ContentAnalyzer` - 把原始内容变成结果
//! - `JobStore` - 任务/条目/数据集的持久化

pub mod analyzer;
pub mod job_store;

pub use analyzer::{ContentAnalyzer, MetadataAnalyzer, RawContent};
pub use job_store::{InMemoryJobStore, JobStore};
