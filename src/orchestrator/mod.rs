//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务生命周期和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_service` - 批处理服务
//! - 校验并提交请求，生成任务 ID
//! - 按任务 ID 持有所有 `JobManager`
//! - 快照查询、暂停、恢复、取消
//!
//! ### `job_manager` - 单个任务管理器
//! - 任务状态机（queued / processing / paused / 终态）
//! - 启动调度器，决定最终状态
//! - 创建数据集
//!
//! ### `scheduler` - 工作池调度器
//! - FIFO 派发，Semaphore 限制并发
//! - 回写条目结果和计数器
//! - 条目级重试、stop-on-error
//!
//! ### `app` - 命令行应用
//! - 读取请求文件、轮询进度、写出报告
//!
//! ## 层次关系
//!
//! ```text
//! app (命令行)
//!     ↓
//! batch_service (多个任务)
//!     ↓
//! job_manager (单个任务的生命周期)
//!     ↓
//! scheduler (单个任务的条目队列)
//!     ↓
//! workflow::ItemProcessor (处理单个条目)
//!     ↓
//! services (能力层：analyzer / job_store)
//!     ↓
//! infrastructure (基础设施：FetchClient)
//! ```

pub mod app;
pub mod batch_service;
pub mod job_manager;
pub mod scheduler;

pub use app::App;
pub use batch_service::BatchService;
pub use job_manager::JobManager;
pub use scheduler::{JobControl, ScheduleOutcome, Scheduler};
