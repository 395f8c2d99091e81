//! doc_search 工具：向量检索文档片段

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{RetrievalClient, Tool};

/// 检索工具：把检索服务的命中结果以 JSON 文本回给模型
pub struct DocSearchTool {
    client: Arc<RetrievalClient>,
    default_top_k: usize,
}

impl DocSearchTool {
    pub fn new(client: Arc<RetrievalClient>, default_top_k: usize) -> Self {
        Self {
            client,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for DocSearchTool {
    fn name(&self) -> &str {
        "doc_search"
    }

    fn description(&self) -> &str {
        "Search the document corpus for passages relevant to a query. \
         Args: query (string, required), top_k (integer, optional)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "top_k": { "type": "integer", "description": "Number of results to return" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| "Missing required arg: query".to_string())?;
        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(self.default_top_k);

        let matches = self.client.search(query, top_k).await?;
        serde_json::to_string(&serde_json::json!({ "matches": matches }))
            .map_err(|e| format!("Encode result: {}", e))
    }
}
