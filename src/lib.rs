//! # Batch Orchestrator
//!
//! 批量抓取和分析 URL / 文件的任务编排核心
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有网络资源，只暴露抓取能力
//! - `FetchClient` - 预热、指纹轮换、限流退避、网络重试
//! - `FingerprintRotator` - 浏览器请求头指纹目录
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个条目
//! - `ContentAnalyzer` - 内容分析能力
//! - `JobStore` - 持久化能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个条目"的完整处理流程
//! - `ItemCtx` - 上下文封装（job_id + item_index）
//! - `ItemProcessor` - 获取内容 → 分析 → 结果/分类错误
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_service` - 提交/查询/控制入口
//! - `orchestrator/job_manager` - 单个任务的状态机
//! - `orchestrator/scheduler` - 工作池调度
//! - `orchestrator/app` - 命令行应用
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{BatchError, ErrorKind, FetchError, ItemError, Result};
pub use infrastructure::{FetchClient, FingerprintRotator, PageFetcher};
pub use models::{
    BatchItem, BatchJob, BatchOptions, ItemKind, ItemSpec, ItemStatus, JobStatus, Operation,
    SubmitRequest, SubmitResponse,
};
pub use orchestrator::{App, BatchService, JobManager};
pub use services::{ContentAnalyzer, InMemoryJobStore, JobStore, MetadataAnalyzer};
pub use workflow::{ItemCtx, ItemProcessor};
