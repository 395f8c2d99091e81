//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__LLM__MODEL=deepseek-chat`）。API Key 只从环境变量读取。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
}

/// [server] 段：监听端口
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    8080
}

/// [chat] 段：是否启用工具增强路径、历史保留轮数、System Prompt
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatSection {
    /// 对话是否先走工具增强路径（失败回退到纯生成）
    #[serde(default = "default_use_tools")]
    pub use_tools: bool,
    /// 会话历史保留的 user/assistant 对数
    #[serde(default = "default_max_history_exchanges")]
    pub max_history_exchanges: usize,
    /// 覆盖内置 System Prompt（缺省用 DEFAULT_SYSTEM_PROMPT）
    pub system_prompt: Option<String>,
}

fn default_use_tools() -> bool {
    true
}

fn default_max_history_exchanges() -> usize {
    20
}

/// [llm] 段：后端选择、模型、默认温度与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 默认采样温度，可被请求级 temperature 覆盖
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-reasoner".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 发起生成调用的超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
    /// 消费整条输出流的超时（秒）
    #[serde(default = "default_stream_timeout")]
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            stream: default_stream_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_stream_timeout() -> u64 {
    120
}

/// [retrieval] 段：检索服务地址、超时、结果上限与 doc_fetch 路径白名单
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RetrievalSection {
    /// 外部检索服务 base_url；未设置时工具路径不可用
    pub base_url: Option<String>,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,
    /// doc_search 默认返回条数
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// 单条工具结果最大字符数，超出截断
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    /// doc_fetch 允许抓取的相对路径白名单
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_retrieval_timeout_secs() -> u64 {
    15
}

fn default_top_k() -> usize {
    5
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            chat: ChatSection::default(),
            llm: LlmSection::default(),
            retrieval: RetrievalSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.chat.use_tools);
        assert_eq!(cfg.chat.max_history_exchanges, 20);
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.temperature, 0.2);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.llm.timeouts.stream, 120);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!(cfg.retrieval.base_url.is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            f,
            r#"
[server]
port = 9999

[chat]
use_tools = false

[llm]
model = "gpt-4o-mini"
temperature = 0.7

[retrieval]
base_url = "http://retrieval.local"
allowed_paths = ["resume.md"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(f.path().to_path_buf())).unwrap();
        assert_eq!(cfg.server.port, 9999);
        assert!(!cfg.chat.use_tools);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.temperature, 0.7);
        assert_eq!(
            cfg.retrieval.base_url.as_deref(),
            Some("http://retrieval.local")
        );
        assert_eq!(cfg.retrieval.allowed_paths, vec!["resume.md"]);
        // 未出现的键保持默认
        assert_eq!(cfg.llm.timeouts.stream, 120);
    }
}
