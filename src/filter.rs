//! `<think>` 标记过滤器
//!
//! DeepSeek-reasoner 等思考型模型会把推理过程以 `<think>...</think>` 区段混入正文。
//! ThinkFilter 对原始 Token 流逐片段过滤：标记可能被任意切分在片段边界上，
//! 区段内文本直接丢弃（不外发、不保留），未闭合区段在 flush 时整体抑制。
//! strip_think 为全量字符串的一次性等价实现，两者在任意切分粒度下输出一致。

const THINK_START: &str = "<think>";
const THINK_END: &str = "</think>";

/// 流式过滤器：pending 缓冲 + 是否处于思考区段 + 区段闭合后的一次性去空白
#[derive(Debug, Default)]
pub struct ThinkFilter {
    pending: String,
    in_think: bool,
    strip_leading_ws: bool,
}

/// pending 尾部与 marker 前缀的最长重叠长度（不含完整 marker）。
/// marker 为纯 ASCII，按字节比较即可，重叠起点必然落在字符边界上。
fn partial_marker_len(buf: &str, marker: &str) -> usize {
    let max = (marker.len() - 1).min(buf.len());
    for k in (1..=max).rev() {
        if buf.as_bytes()[buf.len() - k..] == marker.as_bytes()[..k] {
            return k;
        }
    }
    0
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理下一个原始片段，返回已确认可外发的文本。
    ///
    /// 区段外：输出 start 标记之前的内容；尾部若是 start 标记的非空前缀则扣留，
    /// 等下一片段确认。区段内：丢弃 end 标记之前的一切，只保留可能是
    /// end 标记前缀的尾部；闭合后对剩余文本做一次去前导空白，再回到区段外逻辑
    /// （同一片段内可能开闭多个区段，循环处理）。
    pub fn process(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let mut out = String::new();
        loop {
            if self.in_think {
                match self.pending.find(THINK_END) {
                    Some(pos) => {
                        self.pending.drain(..pos + THINK_END.len());
                        self.in_think = false;
                        self.strip_leading_ws = true;
                    }
                    None => {
                        let keep = partial_marker_len(&self.pending, THINK_END);
                        self.pending.drain(..self.pending.len() - keep);
                        break;
                    }
                }
            } else {
                if self.strip_leading_ws {
                    let trimmed = self.pending.trim_start();
                    if trimmed.is_empty() {
                        // 全是空白：继续扣留状态，直到出现非空白字符
                        self.pending.clear();
                        break;
                    }
                    let cut = self.pending.len() - trimmed.len();
                    self.pending.drain(..cut);
                    self.strip_leading_ws = false;
                }
                match self.pending.find(THINK_START) {
                    Some(pos) => {
                        out.push_str(&self.pending[..pos]);
                        self.pending.drain(..pos + THINK_START.len());
                        self.in_think = true;
                    }
                    None => {
                        let keep = partial_marker_len(&self.pending, THINK_START);
                        let cut = self.pending.len() - keep;
                        out.push_str(&self.pending[..cut]);
                        self.pending.drain(..cut);
                        break;
                    }
                }
            }
        }
        out
    }

    /// 流结束后恰好调用一次：未闭合区段整体丢弃；
    /// 被扣留的「疑似标记前缀」既然没有补全成标记，原样放出。
    pub fn flush(&mut self) -> String {
        if self.in_think {
            self.pending.clear();
            return String::new();
        }
        std::mem::take(&mut self.pending)
    }
}

/// 一次性过滤：移除完整字符串中的所有 `<think>...</think>` 区段
/// （含闭合标记后紧邻的空白）；未闭合区段抑制到串尾，与流式实现保持一致。
pub fn strip_think(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(THINK_START) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(pos) => {
                out.push_str(&rest[..pos]);
                rest = &rest[pos + THINK_START.len()..];
                match rest.find(THINK_END) {
                    None => break,
                    Some(end) => rest = rest[end + THINK_END.len()..].trim_start(),
                }
            }
        }
    }
    out
}
