//! 工具集的按调用解析
//!
//! 每次工具增强生成调用向 ToolProvider 取一份工具集，调用结束
//! （含失败与提前返回）即随作用域释放；跨调用只共享检索客户端连接池。

use std::sync::Arc;

use crate::tools::{DocFetchTool, DocSearchTool, RetrievalClient, ToolExecutor, ToolRegistry};

/// 工具提供者：持有共享的检索客户端与工具配置
pub struct ToolProvider {
    retrieval: Arc<RetrievalClient>,
    allowed_paths: Vec<String>,
    top_k: usize,
    tool_timeout_secs: u64,
}

impl ToolProvider {
    pub fn new(
        retrieval: Arc<RetrievalClient>,
        allowed_paths: Vec<String>,
        top_k: usize,
        tool_timeout_secs: u64,
    ) -> Self {
        Self {
            retrieval,
            allowed_paths,
            top_k,
            tool_timeout_secs,
        }
    }

    /// 为一次生成调用解析工具集
    pub fn acquire(&self) -> ToolExecutor {
        let mut tools = ToolRegistry::new();
        tools.register(DocSearchTool::new(Arc::clone(&self.retrieval), self.top_k));
        tools.register(DocFetchTool::new(
            Arc::clone(&self.retrieval),
            self.allowed_paths.clone(),
        ));
        ToolExecutor::new(tools, self.tool_timeout_secs)
    }
}
