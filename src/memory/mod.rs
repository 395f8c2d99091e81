//! 记忆层：会话历史存储（内存实现 + 可替换接口）

pub mod session;

pub use session::{InMemorySessionStore, Role, SessionStore, Turn};
