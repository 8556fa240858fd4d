//! 条目处理流程 - 流程层
//!
//! 核心职责：定义"一个条目"的完整处理流程
//!
//! 流程顺序：
//! 1. 获取原始内容（URL 走抓取客户端，文件走本地读取）
//! 2. 交给内容分析服务
//! 3. 组装结果，或返回带分类的错误
//!
//! 这里不做任何条目级重试，重试由调度器决定。

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ItemError;
use crate::infrastructure::PageFetcher;
use crate::models::item::{BatchItem, ItemKind, ItemResult, SourceInfo};
use crate::models::request::Operation;
use crate::services::{ContentAnalyzer, RawContent};
use crate::utils::logging::truncate_text;
use crate::workflow::item_ctx::ItemCtx;

/// 条目处理流程
///
/// - 不持有任何条目状态，可以在多个 worker 间共享
/// - 只依赖抓取能力和分析能力
pub struct ItemProcessor {
    fetcher: Arc<dyn PageFetcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    item_timeout: Duration,
}

impl ItemProcessor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        Self {
            fetcher,
            analyzer,
            item_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn PageFetcher>,
        analyzer: Arc<dyn ContentAnalyzer>,
    ) -> Self {
        Self::new(fetcher, analyzer).with_item_timeout(config.item_timeout())
    }

    pub fn with_item_timeout(mut self, item_timeout: Duration) -> Self {
        self.item_timeout = item_timeout;
        self
    }

    /// 处理单个条目，整体耗时受 `item_timeout` 限制
    pub async fn process(
        &self,
        item: &BatchItem,
        operation: &Operation,
        ctx: &ItemCtx,
    ) -> Result<ItemResult, ItemError> {
        match tokio::time::timeout(self.item_timeout, self.run(item, operation, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} ⏱️ 处理超时 ({:?})", ctx, self.item_timeout);
                Err(ItemError::network(format!(
                    "处理超时: timed out after {:?}",
                    self.item_timeout
                )))
            }
        }
    }

    async fn run(
        &self,
        item: &BatchItem,
        operation: &Operation,
        ctx: &ItemCtx,
    ) -> Result<ItemResult, ItemError> {
        info!(
            "{} 🔍 开始处理 {} ({})",
            ctx,
            truncate_text(&item.source, 80),
            operation
        );

        let content = match item.kind {
            ItemKind::Url => self.fetch_url(item, ctx).await?,
            ItemKind::File => self.read_file(item, ctx).await?,
        };

        let data = self
            .analyzer
            .analyze(operation, item, &content)
            .await
            .map_err(|e| ItemError::processing(format!("{:#}", e)))?;

        info!("{} ✓ 处理完成", ctx);

        Ok(ItemResult {
            operation: operation.name().to_string(),
            data,
            source: content.source,
        })
    }

    async fn fetch_url(&self, item: &BatchItem, ctx: &ItemCtx) -> Result<RawContent, ItemError> {
        let referer = referer_of(item.metadata.as_ref());
        let response = self.fetcher.fetch(&item.source, referer).await?;

        if !response.is_success() {
            warn!("{} ⚠️ 非成功状态码 {}", ctx, response.status);
            return Err(ItemError::http_status(response.status, &response.final_url));
        }

        debug!("{} 获取到 {} 字节", ctx, response.body.len());

        Ok(RawContent {
            source: SourceInfo {
                status: Some(response.status),
                final_url: Some(response.final_url),
                content_type: response.content_type,
                bytes: response.body.len(),
            },
            text: response.body,
        })
    }

    async fn read_file(&self, item: &BatchItem, ctx: &ItemCtx) -> Result<RawContent, ItemError> {
        let text = tokio::fs::read_to_string(&item.source)
            .await
            .map_err(|e| ItemError::processing(format!("读取文件失败 {}: {}", item.source, e)))?;

        debug!("{} 读取文件 {} 字节", ctx, text.len());

        Ok(RawContent {
            source: SourceInfo {
                bytes: text.len(),
                ..SourceInfo::default()
            },
            text,
        })
    }
}

/// 条目元信息中的 `referer` 字段
fn referer_of(metadata: Option<&JsonValue>) -> Option<&str> {
    metadata?.get("referer")?.as_str().filter(|r| !r.is_empty())
}
