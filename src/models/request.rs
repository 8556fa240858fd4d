//! 批处理请求模型
//!
//! 提交接口的输入/输出，以及提交时的同步校验（fatal 错误在这里产生）

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::error::{BatchError, Result};
use crate::models::item::{BatchItem, ItemKind};
use crate::models::job::{BatchOptions, JobStatus};

/// 引用格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
    Chicago,
}

/// 批处理操作
///
/// 每种操作携带自己的参数，与调度策略无关
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    AnalyzeUrl {
        #[serde(default)]
        include_entities: bool,
    },
    #[serde(rename_all = "camelCase")]
    ExtractContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_chars: Option<usize>,
    },
    GenerateCitation {
        #[serde(default)]
        style: CitationStyle,
    },
    ScrapeMetadata {},
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AnalyzeUrl { .. } => "analyze-url",
            Operation::ExtractContent { .. } => "extract-content",
            Operation::GenerateCitation { .. } => "generate-citation",
            Operation::ScrapeMetadata {} => "scrape-metadata",
        }
    }

    /// 校验操作参数
    pub fn validate(&self) -> Result<()> {
        if let Operation::ExtractContent { max_chars: Some(0) } = self {
            return Err(BatchError::invalid_request(
                "extract-content 的 maxChars 必须大于 0",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 请求中的单个条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl ItemSpec {
    pub fn url(source: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: ItemKind::Url,
            source: source.into(),
            metadata: None,
        }
    }

    pub fn file(source: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: ItemKind::File,
            source: source.into(),
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 请求中的选项，未填写的字段使用默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_failed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_datasets: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_retry_limit: Option<u32>,
}

impl RequestOptions {
    /// 合并默认值，`default_workers` 来自配置
    pub fn resolve(&self, default_workers: usize) -> BatchOptions {
        let defaults = BatchOptions::default();
        BatchOptions {
            max_workers: self.max_workers.unwrap_or(default_workers),
            retry_failed: self.retry_failed.unwrap_or(defaults.retry_failed),
            stop_on_error: self.stop_on_error.unwrap_or(defaults.stop_on_error),
            create_datasets: self.create_datasets.unwrap_or(defaults.create_datasets),
            item_retry_limit: self.item_retry_limit.unwrap_or(defaults.item_retry_limit),
        }
    }
}

/// 提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub operation: Operation,
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub options: RequestOptions,
}

impl SubmitRequest {
    pub fn new(operation: Operation, items: Vec<ItemSpec>) -> Self {
        Self {
            operation,
            items,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// 校验请求并生成条目列表
    ///
    /// 任何不合法的输入都以 fatal 错误同步返回，不会创建任务
    pub fn validate(&self, default_workers: usize) -> Result<(BatchOptions, Vec<BatchItem>)> {
        self.operation.validate()?;

        if self.items.is_empty() {
            return Err(BatchError::invalid_request("条目列表不能为空"));
        }

        let options = self.options.resolve(default_workers);
        if options.max_workers < 1 {
            return Err(BatchError::invalid_request("maxWorkers 必须 >= 1"));
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(self.items.len());
        for (index, spec) in self.items.iter().enumerate() {
            if spec.source.trim().is_empty() {
                return Err(BatchError::invalid_request(format!(
                    "第 {} 个条目的 source 为空",
                    index + 1
                )));
            }

            let id = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("item-{}", index + 1));
            if !seen.insert(id.clone()) {
                return Err(BatchError::invalid_request(format!("条目 ID 重复: {}", id)));
            }

            items.push(
                BatchItem::new(id, spec.kind, spec.source.trim())
                    .with_metadata(spec.metadata.clone()),
            );
        }

        Ok((options, items))
    }
}

/// 提交响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parses_from_tagged_json() {
        let request: SubmitRequest = serde_json::from_value(serde_json::json!({
            "operation": "generate-citation",
            "style": "mla",
            "items": [{"type": "url", "source": "https://example.com"}],
            "options": {"maxWorkers": 2}
        }))
        .unwrap();

        assert_eq!(
            request.operation,
            Operation::GenerateCitation {
                style: CitationStyle::Mla
            }
        );
        assert_eq!(request.options.max_workers, Some(2));
        assert_eq!(request.options.retry_failed, None);
    }

    #[test]
    fn test_validate_assigns_ids_and_defaults() {
        let request = SubmitRequest::new(
            Operation::ScrapeMetadata {},
            vec![
                ItemSpec::url("https://a.example").with_id("a"),
                ItemSpec::file(" notes.txt "),
            ],
        );

        let (options, items) = request.validate(5).unwrap();
        assert_eq!(options.max_workers, 5);
        assert!(!options.retry_failed);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[1].id, "item-2");
        assert_eq!(items[1].source, "notes.txt");
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let empty = SubmitRequest::new(Operation::ScrapeMetadata {}, vec![]);
        assert!(matches!(
            empty.validate(5),
            Err(BatchError::InvalidRequest(_))
        ));

        let zero_workers = SubmitRequest::new(
            Operation::ScrapeMetadata {},
            vec![ItemSpec::url("https://a.example")],
        )
        .with_options(RequestOptions {
            max_workers: Some(0),
            ..Default::default()
        });
        assert!(zero_workers.validate(5).is_err());

        let duplicate = SubmitRequest::new(
            Operation::ScrapeMetadata {},
            vec![
                ItemSpec::url("https://a.example").with_id("x"),
                ItemSpec::url("https://b.example").with_id("x"),
            ],
        );
        assert!(duplicate.validate(5).is_err());

        let bad_payload = SubmitRequest::new(
            Operation::ExtractContent { max_chars: Some(0) },
            vec![ItemSpec::url("https://a.example")],
        );
        assert!(bad_payload.validate(5).is_err());
    }
}
