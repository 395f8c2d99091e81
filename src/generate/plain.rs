//! 纯生成路径：System Prompt + 历史 + 当前输入，直接流式完成，无外部调用

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::core::ChatError;
use crate::generate::{FragmentStream, Generator};
use crate::llm::{GenerationParams, LlmClient};
use crate::memory::Turn;

/// 纯生成器：Token 流原样透传（文本归一化已在 LLM 客户端完成）
pub struct PlainGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl PlainGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl Generator for PlainGenerator {
    async fn generate(
        &self,
        history: &[Turn],
        input: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream, ChatError> {
        let mut messages = vec![Turn::system(self.system_prompt.clone())];
        messages.extend_from_slice(history);
        messages.push(Turn::user(input));

        let tokens = self
            .llm
            .complete_stream(&messages, params)
            .await
            .map_err(ChatError::Llm)?;

        Ok(Box::pin(tokens.map(|item| item.map_err(ChatError::Llm))))
    }
}
