//! Hive - Rust 对话网关
//!
//! 模块划分：
//! - **api**: HTTP 路由（同步 JSON 与 SSE 流式交付）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、流式事件、回合编排与原子提交
//! - **filter**: `<think>` 标记的流式过滤状态机
//! - **generate**: 生成路径（纯生成 / 工具增强）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 会话历史存储
//! - **observability**: 日志初始化
//! - **tools**: 检索工具（doc_search / doc_fetch）与执行器

pub mod api;
pub mod config;
pub mod core;
pub mod filter;
pub mod generate;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
