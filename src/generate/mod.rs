//! 生成路径：纯生成与工具增强生成
//!
//! Generator 把（历史, 输入, 参数）统一映射为「文本片段流或显式失败」；
//! 后端形态差异（直接流式 / 先工具循环再下发）不外露给编排器。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::ChatError;
use crate::llm::GenerationParams;
use crate::memory::Turn;

pub mod agent;
pub mod plain;

pub use agent::ToolAugmentedGenerator;
pub use plain::PlainGenerator;

/// 原始片段流（未过滤）
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// 生成后端接口
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        history: &[Turn],
        input: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream, ChatError>;
}

/// 已完成文本切片下发时每段字符数
pub(crate) const CHUNK_CHARS: usize = 6;

/// 把整段文本按固定字符数切成片段
pub(crate) fn chunk_fragments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(CHUNK_CHARS).map(|c| c.iter().collect()).collect()
}
