//! 回合编排器
//!
//! 每个请求：读会话历史 → 先试工具增强路径（启用时），任何失败（传输、超时、
//! 解析、过滤后为空）记日志并回退到纯生成路径 → 输出流经 ThinkFilter 过滤 →
//! 校验非空 → 把 user/assistant 回合对一次性原子提交进会话。
//! 被放弃的路径（回退、断开、失败）绝不触碰历史。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use futures_util::StreamExt;

use crate::config::AppConfig;
use crate::core::{ChatError, ChatEvent};
use crate::filter::ThinkFilter;
use crate::generate::{Generator, PlainGenerator, ToolAugmentedGenerator};
use crate::llm::{create_deepseek_client, GenerationParams, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{SessionStore, Turn};
use crate::tools::{RetrievalClient, ToolProvider};

/// 内置 System Prompt（可用配置 [chat].system_prompt 覆盖）
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, terse assistant. Answer clearly.";

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Arc::new(create_deepseek_client(Some(&cfg.llm.model)))
    } else if use_openai {
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            base,
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::default())
    }
}

/// 按配置组装编排器：LLM、纯生成路径、可选的工具增强路径
pub fn create_orchestrator(cfg: &AppConfig, store: Arc<dyn SessionStore>) -> ChatOrchestrator {
    let llm = create_llm_from_config(cfg);
    let system_prompt = cfg
        .chat
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    let plain: Arc<dyn Generator> = Arc::new(PlainGenerator::new(
        Arc::clone(&llm),
        system_prompt.clone(),
    ));

    let tool_augmented: Option<Arc<dyn Generator>> = if cfg.chat.use_tools {
        match cfg.retrieval.base_url.as_deref() {
            Some(base) => {
                let retrieval = Arc::new(RetrievalClient::new(
                    base,
                    cfg.retrieval.timeout_secs,
                    cfg.retrieval.max_result_chars,
                ));
                let provider = Arc::new(ToolProvider::new(
                    retrieval,
                    cfg.retrieval.allowed_paths.clone(),
                    cfg.retrieval.top_k,
                    cfg.retrieval.tool_timeout_secs,
                ));
                tracing::info!("Tool-augmented path enabled (retrieval at {})", base);
                Some(Arc::new(ToolAugmentedGenerator::new(
                    llm,
                    provider,
                    system_prompt,
                )))
            }
            None => {
                tracing::warn!(
                    "[chat].use_tools is on but [retrieval].base_url is unset, plain generation only"
                );
                None
            }
        }
    } else {
        None
    };

    ChatOrchestrator::new(
        store,
        plain,
        tool_augmented,
        cfg.llm.temperature,
        Duration::from_secs(cfg.llm.timeouts.request),
        Duration::from_secs(cfg.llm.timeouts.stream),
    )
}

/// 回合编排器：两条生成路径共用一套「过滤 → 校验 → 提交」管线
pub struct ChatOrchestrator {
    store: Arc<dyn SessionStore>,
    plain: Arc<dyn Generator>,
    tool_augmented: Option<Arc<dyn Generator>>,
    default_temperature: f32,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        plain: Arc<dyn Generator>,
        tool_augmented: Option<Arc<dyn Generator>>,
        default_temperature: f32,
        request_timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            store,
            plain,
            tool_augmented,
            default_temperature,
            request_timeout,
            stream_timeout,
        }
    }

    /// 请求级覆盖落到本次调用参数；配置默认值不被改写
    fn resolve_params(&self, model: Option<String>, temperature: Option<f32>) -> GenerationParams {
        GenerationParams {
            model,
            temperature: temperature.or(Some(self.default_temperature)),
        }
    }

    /// 同步模式：返回完整过滤后的回复
    pub async fn handle(
        &self,
        session_id: &str,
        input: &str,
        model: Option<String>,
        temperature: Option<f32>,
    ) -> Result<String, ChatError> {
        self.run(session_id, input, model, temperature, None).await
    }

    /// 流式模式：过滤器每放行一段就向 tx 发一个 Fragment；
    /// 提交仍在全量校验之后。发送失败视为客户端断开，放弃本次请求。
    pub async fn handle_stream(
        &self,
        session_id: &str,
        input: &str,
        model: Option<String>,
        temperature: Option<f32>,
        tx: &mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<String, ChatError> {
        self.run(session_id, input, model, temperature, Some(tx))
            .await
    }

    async fn run(
        &self,
        session_id: &str,
        input: &str,
        model: Option<String>,
        temperature: Option<f32>,
        tx: Option<&mpsc::UnboundedSender<ChatEvent>>,
    ) -> Result<String, ChatError> {
        let params = self.resolve_params(model, temperature);
        let history = self.store.read(session_id).await;

        let text = match &self.tool_augmented {
            Some(tool_path) => {
                match self
                    .run_path(tool_path.as_ref(), &history, input, &params, tx)
                    .await
                {
                    Ok(text) => text,
                    // 客户端已断开：没有回退的意义
                    Err(ChatError::Disconnected) => return Err(ChatError::Disconnected),
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "tool-augmented path failed, falling back to plain generation");
                        self.run_path(self.plain.as_ref(), &history, input, &params, tx)
                            .await?
                    }
                }
            }
            None => {
                self.run_path(self.plain.as_ref(), &history, input, &params, tx)
                    .await?
            }
        };

        // 全部生成、过滤、校验通过后，才把回合对一次性写入历史
        self.store
            .append_exchange(session_id, Turn::user(input), Turn::assistant(text.clone()))
            .await
            .map_err(ChatError::Store)?;

        Ok(text)
    }

    /// 单条路径的共用管线：生成 → 过滤 → 累计/下发 → 校验非空
    async fn run_path(
        &self,
        generator: &dyn Generator,
        history: &[Turn],
        input: &str,
        params: &GenerationParams,
        tx: Option<&mpsc::UnboundedSender<ChatEvent>>,
    ) -> Result<String, ChatError> {
        let mut stream = timeout(self.request_timeout, generator.generate(history, input, params))
            .await
            .map_err(|_| ChatError::Timeout)??;

        let mut filter = ThinkFilter::new();
        let mut full = String::new();

        let consume = async {
            while let Some(item) = stream.next().await {
                let raw = item?;
                let visible = filter.process(&raw);
                emit(&mut full, visible, tx)?;
            }
            Ok::<(), ChatError>(())
        };
        timeout(self.stream_timeout, consume)
            .await
            .map_err(|_| ChatError::Timeout)??;

        emit(&mut full, filter.flush(), tx)?;

        if full.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(full)
    }
}

/// 累计已过滤文本，流式模式下同步下发；发送失败即客户端断开
fn emit(
    full: &mut String,
    visible: String,
    tx: Option<&mpsc::UnboundedSender<ChatEvent>>,
) -> Result<(), ChatError> {
    if visible.is_empty() {
        return Ok(());
    }
    full.push_str(&visible);
    if let Some(tx) = tx {
        tx.send(ChatEvent::Fragment { text: visible })
            .map_err(|_| ChatError::Disconnected)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::Mutex;

    use crate::generate::FragmentStream;
    use crate::memory::{InMemorySessionStore, Role};

    /// 按脚本回放的测试生成器：每次调用弹出一条结果
    struct ScriptedGenerator {
        outcomes: Mutex<VecDeque<Result<Vec<String>, ChatError>>>,
    }

    impl ScriptedGenerator {
        fn new(outcomes: Vec<Result<Vec<String>, ChatError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
            })
        }

        fn ok(fragments: &[&str]) -> Result<Vec<String>, ChatError> {
            Ok(fragments.iter().map(|s| s.to_string()).collect())
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            _history: &[Turn],
            _input: &str,
            _params: &GenerationParams,
        ) -> Result<FragmentStream, ChatError> {
            let fragments = self
                .outcomes
                .lock()
                .await
                .pop_front()
                .expect("scripted generator exhausted")?;
            let items: Vec<Result<String, ChatError>> = fragments.into_iter().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// 建立流但永不产出片段的生成器，用于流超时测试
    struct StalledGenerator;

    #[async_trait]
    impl Generator for StalledGenerator {
        async fn generate(
            &self,
            _history: &[Turn],
            _input: &str,
            _params: &GenerationParams,
        ) -> Result<FragmentStream, ChatError> {
            Ok(Box::pin(stream::pending()))
        }
    }

    fn orchestrator(
        store: Arc<dyn SessionStore>,
        plain: Arc<dyn Generator>,
        tool: Option<Arc<dyn Generator>>,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(
            store,
            plain,
            tool,
            0.2,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_plain_reply_committed_as_pair() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&["Hello", " there"])]);
        let orch = orchestrator(store.clone(), plain, None);

        let text = orch.handle("s1", "hi", None, None).await.unwrap();
        assert_eq!(text, "Hello there");

        let turns = store.read("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "Hello there");
    }

    #[tokio::test]
    async fn test_think_regions_never_reach_history() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&[
            "<thi",
            "nk>secret reasoning</th",
            "ink>   The answer",
            " is 4.",
        ])]);
        let orch = orchestrator(store.clone(), plain, None);

        let text = orch.handle("s1", "q", None, None).await.unwrap();
        assert_eq!(text, "The answer is 4.");

        let turns = store.read("s1").await;
        assert_eq!(turns[1].content, "The answer is 4.");
        assert!(!turns[1].content.contains("think"));
    }

    #[tokio::test]
    async fn test_tool_path_failure_falls_back_transparently() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let tool = ScriptedGenerator::new(vec![Err(ChatError::Llm("connection refused".into()))]);
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&["ok"])]);
        let orch = orchestrator(store.clone(), plain, Some(tool));

        let text = orch.handle("s1", "hi", None, None).await.unwrap();
        assert_eq!(text, "ok");

        // 只提交一对，不是两对
        let turns = store.read("s1").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "ok");
    }

    #[tokio::test]
    async fn test_empty_after_filter_triggers_fallback() {
        let store = Arc::new(InMemorySessionStore::new(20));
        // 工具路径整条输出都在思考区段里
        let tool = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&[
            "<think>nothing visible</think>",
            "   ",
        ])]);
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&["fallback answer"])]);
        let orch = orchestrator(store.clone(), plain, Some(tool));

        let text = orch.handle("s1", "hi", None, None).await.unwrap();
        assert_eq!(text, "fallback answer");
    }

    #[tokio::test]
    async fn test_both_paths_failing_commits_nothing() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let tool = ScriptedGenerator::new(vec![Err(ChatError::Timeout)]);
        let plain = ScriptedGenerator::new(vec![Err(ChatError::Llm("boom".into()))]);
        let orch = orchestrator(store.clone(), plain, Some(tool));

        assert!(orch.handle("s1", "hi", None, None).await.is_err());
        assert!(store.read("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_plain_empty_output_is_terminal() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&["<think>x</think>"])]);
        let orch = orchestrator(store.clone(), plain, None);

        let err = orch.handle("s1", "hi", None, None).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
        assert!(store.read("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_fragments_match_final_text() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&[
            "Hello <think>hid",
            "den</think> world",
        ])]);
        let orch = orchestrator(store.clone(), plain, None);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let text = orch
            .handle_stream("s1", "hi", None, None, &tx)
            .await
            .unwrap();
        drop(tx);

        let mut streamed = String::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                ChatEvent::Fragment { text } => streamed.push_str(&text),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(streamed, text);
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_disconnect_aborts_without_commit() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![ScriptedGenerator::ok(&["some", " reply"])]);
        let orch = orchestrator(store.clone(), plain, None);

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx); // 客户端立刻断开
        let err = orch
            .handle_stream("s1", "hi", None, None, &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Disconnected));
        assert!(store.read("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let orch = ChatOrchestrator::new(
            store.clone(),
            Arc::new(StalledGenerator),
            None,
            0.2,
            Duration::from_millis(200),
            Duration::from_millis(50),
        );

        let err = orch.handle("s1", "hi", None, None).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout));
        assert!(store.read("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_history_grows_across_requests() {
        let store = Arc::new(InMemorySessionStore::new(20));
        let plain = ScriptedGenerator::new(vec![
            ScriptedGenerator::ok(&["first"]),
            ScriptedGenerator::ok(&["second"]),
        ]);
        let orch = orchestrator(store.clone(), plain, None);

        orch.handle("s1", "q1", None, None).await.unwrap();
        orch.handle("s1", "q2", None, None).await.unwrap();

        let turns = store.read("s1").await;
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].content, "q2");
        assert_eq!(turns[3].content, "second");
    }

    #[tokio::test]
    async fn test_mid_stream_error_on_plain_path_commits_nothing() {
        let store = Arc::new(InMemorySessionStore::new(20));

        struct HalfThenFail;
        #[async_trait]
        impl Generator for HalfThenFail {
            async fn generate(
                &self,
                _history: &[Turn],
                _input: &str,
                _params: &GenerationParams,
            ) -> Result<FragmentStream, ChatError> {
                let items: Vec<Result<String, ChatError>> = vec![
                    Ok("partial ".to_string()),
                    Err(ChatError::Llm("stream reset".into())),
                ];
                Ok(Box::pin(stream::iter(items)))
            }
        }

        let orch = orchestrator(store.clone(), Arc::new(HalfThenFail), None);
        assert!(orch.handle("s1", "hi", None, None).await.is_err());
        assert!(store.read("s1").await.is_empty());
    }
}
