//! 流式交付事件：fragment / error / done
//!
//! done 恒为终止事件且恰好发送一次（无论成败），客户端据此判定回合结束。

/// 流式回复事件；SSE 的事件名与数据体由 name / data 给出
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// 过滤器放行的一段可见文本
    Fragment { text: String },
    /// 生成失败（纯生成路径也失败后才会出现）
    Error { text: String },
    /// 回合结束，携带会话 id
    Done { session_id: String },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Fragment { .. } => "fragment",
            ChatEvent::Error { .. } => "error",
            ChatEvent::Done { .. } => "done",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            ChatEvent::Fragment { text } => text,
            ChatEvent::Error { text } => text,
            ChatEvent::Done { session_id } => session_id,
        }
    }
}
