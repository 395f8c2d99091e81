//! 检索服务客户端
//!
//! 外部检索服务的 HTTP 接口（索引本身不归网关管）：
//! - POST {base}/search，body {"query", "top_k"}，返回 {"matches": [{text, score, source_uri}]}
//! - GET {base}/documents/{path}，返回文档原文
//!
//! 响应超过 max_result_chars 时截断并追加 ...[truncated]。

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// 单条检索命中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<RetrievalMatch>,
}

/// 检索客户端：超时与结果大小上限由配置决定
pub struct RetrievalClient {
    client: Client,
    base_url: String,
    max_result_chars: usize,
}

impl RetrievalClient {
    pub fn new(base_url: &str, timeout_secs: u64, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_result_chars,
        }
    }

    fn truncate(&self, body: String) -> String {
        if body.chars().count() > self.max_result_chars {
            body.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            body
        }
    }

    /// 向量检索：返回与 query 相关的文档片段
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalMatch>, String> {
        let url = format!("{}/search", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query, "top_k": top_k }))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("Decode response: {}", e))?;
        Ok(body
            .matches
            .into_iter()
            .map(|mut m| {
                m.text = self.truncate(m.text);
                m
            })
            .collect())
    }

    /// 按相对路径取回整篇文档原文（路径校验在工具层完成）
    pub async fn fetch(&self, path: &str) -> Result<String, String> {
        let url = format!("{}/documents/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(format!("Document not found: {}", path));
        }
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        Ok(self.truncate(body))
    }
}
