//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式）、
//! complete_stream（流式 Token）。本层统一归一为「纯文本或显式失败」：
//! Ok("") 表示成功但无内容，与 Err 区分，由上层校验环节处置。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::memory::Turn;

/// 请求级可覆盖参数；None 表示沿用客户端/配置默认值。
/// 覆盖只作用于本次调用，不回写配置。
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Token 流：文本增量或错误
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(
        &self,
        messages: &[Turn],
        params: &GenerationParams,
    ) -> Result<String, String>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(
        &self,
        messages: &[Turn],
        params: &GenerationParams,
    ) -> Result<TokenStream, String>;
}
