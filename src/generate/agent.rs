//! 工具增强生成路径
//!
//! 每次调用从 ToolProvider 取一份工具集（任何出口都随作用域释放），然后循环：
//! 组装 Prompt（基础 Prompt + 工具清单 + 调用 Schema）调 LLM，输出解析为
//! Tool Call 则执行并把 Observation 写回对话，解析为普通文本则作为最终回复。
//! 步数上限内未收敛视为该路径失败，由编排器回退到纯生成。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use serde::{Deserialize, Serialize};

use crate::core::ChatError;
use crate::generate::{chunk_fragments, FragmentStream, Generator};
use crate::llm::{GenerationParams, LlmClient};
use crate::memory::Turn;
use crate::tools::{ToolExecutor, ToolProvider};

/// 单次对话内最大工具步数，防止死循环
const MAX_TOOL_STEPS: usize = 6;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "doc_search", "args": {"query": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: serde_json::Value,
}

/// 单步解析结果
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// 直接回复用户
    Reply(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 解析 LLM 输出：含有效 Tool Call JSON（```json 块或裸 JSON）则为 ToolCall，
/// 否则视为普通回复。带 "tool" 字样却解析不出来的 JSON 算路径失败，
/// 不能把半截工具调用当正文发给用户。
pub fn parse_step_output(output: &str) -> Result<StepOutput, ChatError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Ok(StepOutput::Reply(trimmed.to_string()));
    };

    match serde_json::from_str::<ToolCall>(json_str) {
        Ok(tc) if !tc.tool.is_empty() => Ok(StepOutput::ToolCall(tc)),
        Ok(_) => Ok(StepOutput::Reply(trimmed.to_string())),
        Err(e) => {
            if json_str.contains("\"tool\"") {
                Err(ChatError::MalformedToolCall(format!("{}: {}", e, json_str)))
            } else {
                // 正文里恰好带花括号的普通回复
                Ok(StepOutput::Reply(trimmed.to_string()))
            }
        }
    }
}

/// 工具增强生成器：内部收敛出最终回复后，按固定块大小切成片段流下发。
/// 第一个片段发出时该路径已不可能再失败，回退对流式客户端不可见。
pub struct ToolAugmentedGenerator {
    llm: Arc<dyn LlmClient>,
    provider: Arc<ToolProvider>,
    system_prompt: String,
}

impl ToolAugmentedGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        provider: Arc<ToolProvider>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            provider,
            system_prompt: system_prompt.into(),
        }
    }

    fn tool_system_prompt(&self, executor: &ToolExecutor) -> String {
        let tool_list: String = executor
            .tool_descriptions()
            .iter()
            .map(|(name, desc)| format!("- {}: {}", name, desc))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\nAvailable tools:\n{}\n\n\
             ## Tool call JSON Schema (you must output valid JSON matching this)\n\
             ```json\n{}\n```\n\
             To call a tool, reply with ONLY a JSON object {{\"tool\": \"...\", \"args\": {{...}}}}.\n\
             Otherwise answer the user directly in plain text.",
            self.system_prompt,
            tool_list,
            executor.to_schema_json()
        )
    }

    async fn run_loop(
        &self,
        history: &[Turn],
        input: &str,
        params: &GenerationParams,
    ) -> Result<String, ChatError> {
        let executor = self.provider.acquire();
        let system = self.tool_system_prompt(&executor);

        let mut messages = vec![Turn::system(system)];
        messages.extend_from_slice(history);
        messages.push(Turn::user(input));

        for step in 0..MAX_TOOL_STEPS {
            let output = self
                .llm
                .complete(&messages, params)
                .await
                .map_err(ChatError::Llm)?;
            if output.trim().is_empty() {
                return Err(ChatError::EmptyResponse);
            }

            match parse_step_output(&output)? {
                StepOutput::Reply(resp) => return Ok(resp),
                StepOutput::ToolCall(tc) => {
                    if !executor.contains(&tc.tool) {
                        return Err(ChatError::UnknownTool(tc.tool));
                    }
                    tracing::debug!(step, tool = %tc.tool, "tool call");
                    // 工具执行失败作为 Observation 写回，让模型自行调整，不直接判死该路径
                    let observation = match executor.execute(&tc.tool, tc.args.clone()).await {
                        Ok(r) => r,
                        Err(e) => format!("Error: {}", e),
                    };
                    messages.push(Turn::assistant(format!(
                        "Tool call: {} | Result: {}",
                        tc.tool, observation
                    )));
                    messages.push(Turn::user(format!(
                        "Observation from {}: {}",
                        tc.tool, observation
                    )));
                }
            }
        }
        Err(ChatError::ToolStepLimit)
    }
}

#[async_trait]
impl Generator for ToolAugmentedGenerator {
    async fn generate(
        &self,
        history: &[Turn],
        input: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream, ChatError> {
        let response = self.run_loop(history, input, params).await?;
        let fragments: Vec<Result<String, ChatError>> =
            chunk_fragments(&response).into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_reply() {
        match parse_step_output("The answer is 4.").unwrap() {
            StepOutput::Reply(r) => assert_eq!(r, "The answer is 4."),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_json_tool_call() {
        let out = r#"{"tool": "doc_search", "args": {"query": "resume"}}"#;
        match parse_step_output(out).unwrap() {
            StepOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "doc_search");
                assert_eq!(tc.args["query"], "resume");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_fenced_json_tool_call() {
        let out = "Let me search.\n```json\n{\"tool\": \"doc_fetch\", \"args\": {\"path\": \"resume.md\"}}\n```";
        match parse_step_output(out).unwrap() {
            StepOutput::ToolCall(tc) => assert_eq!(tc.tool, "doc_fetch"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reply_with_braces_is_not_a_tool_call() {
        let out = "In Rust, `struct Foo { x: i32 }` defines a type.";
        match parse_step_output(out).unwrap() {
            StepOutput::Reply(r) => assert_eq!(r, out),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tool_json_is_an_error() {
        let out = r#"{"tool": "doc_search", "args": {"query": }"#;
        assert!(matches!(
            parse_step_output(out),
            Err(ChatError::MalformedToolCall(_))
        ));
    }

    #[test]
    fn test_empty_tool_field_is_a_reply() {
        let out = r#"{"tool": "", "args": {}}"#;
        assert!(matches!(
            parse_step_output(out).unwrap(),
            StepOutput::Reply(_)
        ));
    }
}
