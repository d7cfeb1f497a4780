//! 记忆
//!
//! | 组件 | 作用域 |
//! |------|--------|
//! | [`ChatMemory`] | 进程内的对话历史，按 token 预算给出最近若干轮 |
//! | [`NotesStore`] | 追加写入的客服备注文件，跨进程保留 |

pub mod notes;

pub use notes::{Note, NotesStore};

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Agent 写、知识库工具读的共享对话记忆
pub type SharedMemory = Arc<RwLock<ChatMemory>>;

/// 粗略估算 token 数：字节数 / 4 + 1
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 首字母大写，用于 `Role: content` 形式的历史行
impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
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

    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// 对话历史 + token 预算
///
/// 只能追加，不能修改已有轮次。[`window`](Self::window) 从最新一轮往回累加，
/// 加入下一轮会超出预算时停止，因此最早的轮次最先被挤出，结果永远不超预算。
///
/// ```rust
/// use shopdesk::memory::{ChatMemory, ConversationTurn};
///
/// let mut memory = ChatMemory::new(2500);
/// memory.append(ConversationTurn::user("How much is the UltraPhone X?"));
/// memory.append(ConversationTurn::assistant("It costs $799."));
/// assert_eq!(memory.window().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ChatMemory {
    turns: Vec<ConversationTurn>,
    token_limit: usize,
}

impl ChatMemory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            turns: Vec::new(),
            token_limit,
        }
    }

    pub fn shared(token_limit: usize) -> SharedMemory {
        Arc::new(RwLock::new(Self::new(token_limit)))
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// 预算内的最近若干轮，按时间从旧到新
    pub fn window(&self) -> Vec<ConversationTurn> {
        let mut used = 0usize;
        let mut start = self.turns.len();
        for (i, turn) in self.turns.iter().enumerate().rev() {
            let cost = turn.token_estimate();
            if used + cost > self.token_limit {
                break;
            }
            used += cost;
            start = i;
        }
        self.turns[start..].to_vec()
    }

    /// 清空全部历史
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// 完整历史（不受预算限制）
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn token_estimate(&self) -> usize {
        self.turns.iter().map(ConversationTurn::token_estimate).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
