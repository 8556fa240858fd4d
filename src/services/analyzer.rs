//! 内容分析服务 - 业务能力层
//!
//! 只负责"把原始内容变成结果"，不关心抓取和调度。
//! 外部的摘要/实体抽取服务通过 `ContentAnalyzer` 接入，
//! `MetadataAnalyzer` 是内置的轻量实现，只读取 HTML 中已有的元信息。

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::models::item::{BatchItem, SourceInfo};
use crate::models::request::{CitationStyle, Operation};

/// 交给分析服务的原始内容
#[derive(Debug, Clone)]
pub struct RawContent {
    pub text: String,
    pub source: SourceInfo,
}

/// 内容分析能力
///
/// 每个成功获取内容的条目调用一次，返回的错误会被归类为 `processing_error`
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        operation: &Operation,
        item: &BatchItem,
        content: &RawContent,
    ) -> Result<JsonValue>;
}

/// 内置的元信息分析器
///
/// 职责：
/// - 读取 `<title>`、`<meta>`、canonical 等已有信息
/// - 不做摘要和实体识别
pub struct MetadataAnalyzer {
    title_re: Regex,
    meta_tag_re: Regex,
    meta_attr_re: Regex,
    canonical_re: Regex,
    heading_re: Regex,
    link_re: Regex,
    script_re: Regex,
    tag_re: Regex,
}

impl MetadataAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            meta_tag_re: Regex::new(r"(?is)<meta\s+[^>]*>")?,
            meta_attr_re: Regex::new(r#"(?is)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?,
            canonical_re: Regex::new(
                r#"(?is)<link\s+[^>]*rel\s*=\s*["']canonical["'][^>]*href\s*=\s*["']([^"']+)["']"#,
            )?,
            heading_re: Regex::new(r"(?is)<h[1-3][^>]*>(.*?)</h[1-3]>")?,
            link_re: Regex::new(r"(?is)<a\s+[^>]*href\s*=")?,
            script_re: Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")?,
            tag_re: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn title(&self, html: &str) -> Option<String> {
        self.title_re
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| collapse_whitespace(m.as_str()))
            .filter(|t| !t.is_empty())
    }

    /// 收集 `<meta name|property=... content=...>`
    fn meta_tags(&self, html: &str) -> Vec<(String, String)> {
        let mut tags = Vec::new();
        for tag in self.meta_tag_re.find_iter(html) {
            let mut key = None;
            let mut content = None;
            for cap in self.meta_attr_re.captures_iter(tag.as_str()) {
                let name = cap[1].to_ascii_lowercase();
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                match name.as_str() {
                    "name" | "property" => key = Some(value.to_ascii_lowercase()),
                    "content" => content = Some(value),
                    _ => {}
                }
            }
            if let (Some(key), Some(content)) = (key, content) {
                tags.push((key, content));
            }
        }
        tags
    }

    fn meta<'a>(tags: &'a [(String, String)], keys: &[&str]) -> Option<&'a str> {
        keys.iter().find_map(|wanted| {
            tags.iter()
                .find(|(k, v)| k == wanted && !v.is_empty())
                .map(|(_, v)| v.as_str())
        })
    }

    fn canonical(&self, html: &str) -> Option<String> {
        self.canonical_re
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn headings(&self, html: &str) -> Vec<String> {
        self.heading_re
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| collapse_whitespace(&self.strip_tags(m.as_str())))
            .filter(|h| !h.is_empty())
            .collect()
    }

    fn visible_text(&self, html: &str) -> String {
        let without_scripts = self.script_re.replace_all(html, " ");
        collapse_whitespace(&self.strip_tags(&without_scripts))
    }

    fn strip_tags(&self, html: &str) -> String {
        self.tag_re.replace_all(html, " ").into_owned()
    }

    fn scrape_metadata(&self, item: &BatchItem, content: &RawContent) -> JsonValue {
        let html = &content.text;
        let tags = self.meta_tags(html);
        json!({
            "url": content.source.final_url.as_deref().unwrap_or(&item.source),
            "title": Self::meta(&tags, &["og:title", "twitter:title"])
                .map(str::to_string)
                .or_else(|| self.title(html)),
            "description": Self::meta(&tags, &["description", "og:description", "twitter:description"]),
            "author": Self::meta(&tags, &["author", "article:author"]),
            "siteName": Self::meta(&tags, &["og:site_name", "application-name"]),
            "publishedAt": Self::meta(&tags, &["article:published_time", "date", "dc.date"]),
            "image": Self::meta(&tags, &["og:image", "twitter:image"]),
            "canonical": self.canonical(html),
        })
    }

    fn extract_content(&self, content: &RawContent, max_chars: Option<usize>) -> JsonValue {
        let text = self.visible_text(&content.text);
        let total_chars = text.chars().count();
        let truncated = max_chars.is_some_and(|limit| total_chars > limit);
        let text = match max_chars {
            Some(limit) if truncated => text.chars().take(limit).collect(),
            _ => text,
        };
        json!({
            "text": text,
            "chars": total_chars,
            "truncated": truncated,
        })
    }

    fn analyze_url(&self, item: &BatchItem, content: &RawContent, include_entities: bool) -> JsonValue {
        let text = self.visible_text(&content.text);
        let mut result = json!({
            "url": content.source.final_url.as_deref().unwrap_or(&item.source),
            "title": self.title(&content.text),
            "wordCount": text.split_whitespace().count(),
            "linkCount": self.link_re.find_iter(&content.text).count(),
            "contentType": content.source.content_type,
        });
        if include_entities {
            result["headings"] = json!(self.headings(&content.text));
        }
        result
    }

    fn generate_citation(
        &self,
        item: &BatchItem,
        content: &RawContent,
        style: CitationStyle,
    ) -> Result<JsonValue> {
        let metadata = self.scrape_metadata(item, content);
        let title = match metadata["title"].as_str() {
            Some(title) => title.to_string(),
            None => bail!("无法生成引用: 页面缺少标题"),
        };
        let url = metadata["url"].as_str().unwrap_or(&item.source).to_string();
        let author = metadata["author"].as_str();
        let site = metadata["siteName"].as_str();
        let year = metadata["publishedAt"]
            .as_str()
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()));

        let citation = match style {
            CitationStyle::Apa => format!(
                "{}({}). {}.{} {}",
                author.map(|a| format!("{} ", a)).unwrap_or_default(),
                year.unwrap_or("n.d."),
                title,
                site.map(|s| format!(" {}.", s)).unwrap_or_default(),
                url
            ),
            CitationStyle::Mla => format!(
                "{}\"{}.\"{} {}",
                author.map(|a| format!("{}. ", a)).unwrap_or_default(),
                title,
                site.map(|s| format!(" {},", s)).unwrap_or_default(),
                url
            ),
            CitationStyle::Chicago => format!(
                "{}\"{}.\"{}{} {}.",
                author.map(|a| format!("{}. ", a)).unwrap_or_default(),
                title,
                site.map(|s| format!(" {}.", s)).unwrap_or_default(),
                year.map(|y| format!(" {}.", y)).unwrap_or_default(),
                url
            ),
        };

        Ok(json!({
            "style": style,
            "citation": citation,
            "metadata": metadata,
        }))
    }
}

#[async_trait]
impl ContentAnalyzer for MetadataAnalyzer {
    async fn analyze(
        &self,
        operation: &Operation,
        item: &BatchItem,
        content: &RawContent,
    ) -> Result<JsonValue> {
        debug!(
            "分析条目 {} ({}), 内容长度: {} 字节",
            item.id,
            operation,
            content.text.len()
        );

        if content.text.trim().is_empty() {
            bail!("内容为空");
        }

        match operation {
            Operation::ScrapeMetadata {} => Ok(self.scrape_metadata(item, content)),
            Operation::ExtractContent { max_chars } => Ok(self.extract_content(content, *max_chars)),
            Operation::AnalyzeUrl { include_entities } => {
                Ok(self.analyze_url(item, content, *include_entities))
            }
            Operation::GenerateCitation { style } => self.generate_citation(item, content, *style),
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemKind;

    const PAGE: &str = r#"<html><head>
        <title> Example   Domain </title>
        <meta name="description" content="An example page">
        <meta property="og:site_name" content="Example">
        <meta name="author" content="Jane Doe">
        <meta property="article:published_time" content="2024-03-01T10:00:00Z">
        <link rel="canonical" href="https://example.com/">
        <script>var x = "<b>ignored</b>";</script>
        </head><body><h1>Example Domain</h1><p>This domain is for use in examples.</p>
        <a href="https://www.iana.org/domains/example">More</a></body></html>"#;

    fn content() -> RawContent {
        RawContent {
            text: PAGE.to_string(),
            source: SourceInfo {
                status: Some(200),
                final_url: Some("https://example.com/".to_string()),
                content_type: Some("text/html".to_string()),
                bytes: PAGE.len(),
            },
        }
    }

    fn item() -> BatchItem {
        BatchItem::new("a", ItemKind::Url, "https://example.com")
    }

    #[tokio::test]
    async fn test_scrape_metadata() {
        let data = MetadataAnalyzer::new()
            .unwrap()
            .analyze(&Operation::ScrapeMetadata {}, &item(), &content())
            .await
            .unwrap();

        assert_eq!(data["title"], "Example Domain");
        assert_eq!(data["description"], "An example page");
        assert_eq!(data["siteName"], "Example");
        assert_eq!(data["canonical"], "https://example.com/");
    }

    #[tokio::test]
    async fn test_extract_content_truncates_and_skips_scripts() {
        let data = MetadataAnalyzer::new()
            .unwrap()
            .analyze(
                &Operation::ExtractContent { max_chars: Some(10) },
                &item(),
                &content(),
            )
            .await
            .unwrap();

        assert_eq!(data["text"].as_str().unwrap().chars().count(), 10);
        assert_eq!(data["truncated"], true);

        let full = MetadataAnalyzer::new()
            .unwrap()
            .analyze(&Operation::ExtractContent { max_chars: None }, &item(), &content())
            .await
            .unwrap();
        assert!(!full["text"].as_str().unwrap().contains("ignored"));
        assert!(full["text"].as_str().unwrap().contains("for use in examples"));
    }

    #[tokio::test]
    async fn test_generate_citation_apa() {
        let data = MetadataAnalyzer::new()
            .unwrap()
            .analyze(
                &Operation::GenerateCitation {
                    style: CitationStyle::Apa,
                },
                &item(),
                &content(),
            )
            .await
            .unwrap();

        assert_eq!(
            data["citation"],
            "Jane Doe (2024). Example Domain. Example. https://example.com/"
        );
    }

    #[tokio::test]
    async fn test_analyze_url_counts() {
        let data = MetadataAnalyzer::new()
            .unwrap()
            .analyze(
                &Operation::AnalyzeUrl {
                    include_entities: true,
                },
                &item(),
                &content(),
            )
            .await
            .unwrap();

        assert_eq!(data["linkCount"], 1);
        assert_eq!(data["headings"][0], "Example Domain");
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let mut raw = content();
        raw.text = "   ".to_string();
        let result = MetadataAnalyzer::new()
            .unwrap()
            .analyze(&Operation::ScrapeMetadata {}, &item(), &raw)
            .await;
        assert!(result.is_err());
    }
}
