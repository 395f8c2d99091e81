//! doc_fetch 工具：按相对路径取回整篇文档
//!
//! 只接受白名单内的相对路径：空路径、绝对路径与 `..` 穿越一律拒绝，
//! 防止模型借工具读到语料之外的文件。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{RetrievalClient, Tool};

/// 校验路径是否安全且在白名单内
fn validate_path(path: &str, allowed: &[String]) -> Result<(), String> {
    if path.is_empty() {
        return Err("Path cannot be empty".to_string());
    }
    if path.starts_with('/') || path.contains("..") {
        return Err("Path traversal and absolute paths are not allowed".to_string());
    }
    if !allowed.iter().any(|a| a == path) {
        return Err(format!("Path \"{}\" is not in the allowed list", path));
    }
    Ok(())
}

/// 文档取回工具：精确路径查找，不做模糊匹配
pub struct DocFetchTool {
    client: Arc<RetrievalClient>,
    allowed_paths: Vec<String>,
}

impl DocFetchTool {
    pub fn new(client: Arc<RetrievalClient>, allowed_paths: Vec<String>) -> Self {
        Self {
            client,
            allowed_paths,
        }
    }
}

#[async_trait]
impl Tool for DocFetchTool {
    fn name(&self) -> &str {
        "doc_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the full text of a document by its relative path. \
         Args: path (string, required); only allow-listed paths are accessible."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Relative document path, e.g. resume.md" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        validate_path(path, &self.allowed_paths).map_err(|e| format!("Invalid path: {}", e))?;

        let content = self.client.fetch(path).await?;
        serde_json::to_string(&serde_json::json!({ "path": path, "content": content }))
            .map_err(|e| format!("Encode result: {}", e))
    }
}
