use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ItemError;

/// 条目类型，决定原始内容的获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Url,
    File,
}

/// 条目状态
///
/// 单调推进，唯一允许的回退是条目级重试时的 `Processing -> Pending`。
/// 被重试的那次失败不会进入 `Error`，快照里也看不到它的错误和完成时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Error)
    }
}

/// 原始内容的来源信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub bytes: usize,
}

/// 单个条目的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub operation: String,
    pub data: JsonValue,
    pub source: SourceInfo,
}

/// 批处理条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
    /// 已派发次数（含重试）
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 处理耗时（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, kind: ItemKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            metadata: None,
            status: ItemStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
            duration: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// 进入 processing，`started_at` 只在第一次派发时写入
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Processing;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn mark_success(&mut self, result: ItemResult, now: DateTime<Utc>) {
        self.status = ItemStatus::Success;
        self.result = Some(result);
        self.error = None;
        self.finish(now);
    }

    pub fn mark_error(&mut self, error: ItemError, now: DateTime<Utc>) {
        self.status = ItemStatus::Error;
        self.error = Some(error);
        self.result = None;
        self.finish(now);
    }

    /// `Processing -> Pending`：放回队列等待整体重试，保留 `attempts` 和首次 `startedAt`
    pub fn mark_retry(&mut self) {
        self.status = ItemStatus::Pending;
        self.error = None;
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.duration = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
    }
}
