use crate::error::{BatchError, Result};
use crate::models::request::SubmitRequest;
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载批处理请求
pub async fn load_toml_to_request(toml_file_path: &Path) -> Result<SubmitRequest> {
    if !toml_file_path.exists() {
        return Err(BatchError::Config(format!(
            "请求文件不存在: {}",
            toml_file_path.display()
        )));
    }

    let content = fs::read_to_string(toml_file_path).await?;
    let request = parse_request(&content)?;

    tracing::info!(
        "成功加载请求 {}: 操作 {}, {} 个条目",
        toml_file_path.display(),
        request.operation,
        request.items.len()
    );

    Ok(request)
}

/// 解析 TOML 文本形式的请求
pub fn parse_request(content: &str) -> Result<SubmitRequest> {
    let request: SubmitRequest = toml::from_str(content)?;
    Ok(request)
}
