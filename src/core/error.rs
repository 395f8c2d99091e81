//! 网关错误类型
//!
//! 工具路径抛出的任何 ChatError 都会触发回退到纯生成路径；
//! 纯生成路径的错误则直接上浮为用户可见的请求错误。

use thiserror::Error;

/// 单次请求处理过程中可能出现的错误（传输、超时、空输出、工具、存储等）
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Backend timeout")]
    Timeout,

    /// 生成名义上成功，但过滤后没有任何可见内容
    #[error("Empty response after filtering")]
    EmptyResponse,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("Tool step limit exceeded")]
    ToolStepLimit,

    #[error("Session store error: {0}")]
    Store(String),

    /// 客户端中途断开：放弃本次生成，不提交历史
    #[error("Client disconnected")]
    Disconnected,
}
