//! 核心：错误类型、流式事件与回合编排

pub mod error;
pub mod events;
pub mod orchestrator;

pub use error::ChatError;
pub use events::ChatEvent;
pub use orchestrator::{
    create_llm_from_config, create_orchestrator, ChatOrchestrator, DEFAULT_SYSTEM_PROMPT,
};
