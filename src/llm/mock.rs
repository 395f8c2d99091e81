//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序回放回复：整段文本、片段流、调用失败、流中途失败，
//! 便于覆盖编排器的回退与提交路径。

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::Mutex;

use crate::llm::{GenerationParams, LlmClient, TokenStream};
use crate::memory::Turn;

/// 单次调用的脚本回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 成功，整段文本（流式时作为单片段下发）
    Text(String),
    /// 成功，按给定片段流式下发
    Fragments(Vec<String>),
    /// 调用本身失败（连接错误等）
    Fail(String),
    /// 流建立成功，但在给定片段之后中途报错
    StreamThenFail(Vec<String>, String),
}

/// Mock 客户端：每次 complete / complete_stream 按序弹出一条脚本
#[derive(Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    async fn next_reply(&self) -> Result<MockReply, String> {
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| "mock: no scripted reply left".to_string())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        _messages: &[Turn],
        _params: &GenerationParams,
    ) -> Result<String, String> {
        match self.next_reply().await? {
            MockReply::Text(t) => Ok(t),
            MockReply::Fragments(v) => Ok(v.concat()),
            MockReply::Fail(e) => Err(e),
            MockReply::StreamThenFail(_, e) => Err(e),
        }
    }

    async fn complete_stream(
        &self,
        _messages: &[Turn],
        _params: &GenerationParams,
    ) -> Result<TokenStream, String> {
        let items: Vec<Result<String, String>> = match self.next_reply().await? {
            MockReply::Text(t) => vec![Ok(t)],
            MockReply::Fragments(v) => v.into_iter().map(Ok).collect(),
            MockReply::Fail(e) => return Err(e),
            MockReply::StreamThenFail(v, e) => {
                let mut items: Vec<Result<String, String>> = v.into_iter().map(Ok).collect();
                items.push(Err(e));
                items
            }
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
