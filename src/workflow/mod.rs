//! 流程层（Workflow）
//!
//! 定义"一个条目"的完整处理流程：获取内容 → 分析 → 结果/分类错误

pub mod item_ctx;
pub mod item_processor;

pub use item_ctx::ItemCtx;
pub use item_processor::ItemProcessor;
