//! 会话历史：按会话 id 保存已提交的对话回合
//!
//! 回合只在编排器校验通过后成对（user + assistant）原子提交；
//! 读取方永远看不到「只写了一半」的回合对。淘汰策略归存储自身管。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

/// 消息角色（与 LLM API 一致）。System 仅用于拼 Prompt，不会被提交进会话。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单个回合：创建后不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 会话存储接口：内存实现开发期够用，生产可在同一接口后换持久化存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取会话当前历史（按提交顺序）；不存在的会话返回空
    async fn read(&self, session_id: &str) -> Vec<Turn>;

    /// 原子提交一对 user/assistant 回合；同一会话上的提交相互串行
    async fn append_exchange(
        &self,
        session_id: &str,
        user: Turn,
        assistant: Turn,
    ) -> Result<(), String>;
}

/// 内存会话存储：外层 RwLock 只管会话表结构，逐会话各一把 Mutex，
/// 同会话提交串行、跨会话互不协调。超出 max_exchanges 对时丢弃最旧回合。
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Vec<Turn>>>>>,
    max_exchanges: usize,
}

impl InMemorySessionStore {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_exchanges,
        }
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<Vec<Turn>>> {
        if let Some(e) = self.sessions.read().await.get(session_id) {
            return Arc::clone(e);
        }
        let mut map = self.sessions.write().await;
        Arc::clone(
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new()))),
        )
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn read(&self, session_id: &str) -> Vec<Turn> {
        let entry = self.sessions.read().await.get(session_id).cloned();
        match entry {
            Some(e) => e.lock().await.clone(),
            None => Vec::new(),
        }
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        user: Turn,
        assistant: Turn,
    ) -> Result<(), String> {
        let entry = self.entry(session_id).await;
        let mut turns = entry.lock().await;
        turns.push(user);
        turns.push(assistant);
        let keep = self.max_exchanges * 2;
        if turns.len() > keep {
            let surplus = turns.len() - keep;
            turns.drain(..surplus);
        }
        Ok(())
    }
}
