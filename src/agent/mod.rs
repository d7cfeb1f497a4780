//! Agent 循环
//!
//! 状态机：`Idle → AwaitingInput → ToolSelection → ToolExecution → ResponseReady → AwaitingInput`，
//! 收到退出指令后进入终止状态 `Shutdown`。

use crate::error::SupportError;
use crate::prompt::{APOLOGY_MESSAGE, RETRY_APOLOGY_MESSAGE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

mod config;
mod support_agent;

pub use config::{AgentConfig, DispatchMode};
pub use support_agent::SupportAgent;

/// 流式执行中产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Token(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, output: String },
    FinalAnswer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    AwaitingInput,
    ToolSelection,
    ToolExecution,
    ResponseReady,
    Shutdown,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::AwaitingInput => "awaiting-input",
            AgentState::ToolSelection => "tool-selection",
            AgentState::ToolExecution => "tool-execution",
            AgentState::ResponseReady => "response-ready",
            AgentState::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// 把一轮失败转换成给用户看的固定道歉
///
/// 外部模型服务的错误提示稍后重试，其余（工具失败、空索引等）使用通用道歉。
pub fn apology_for(err: &SupportError) -> &'static str {
    if err.is_collaborator() {
        RETRY_APOLOGY_MESSAGE
    } else {
        APOLOGY_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexError, LlmError, ToolError};

    #[test]
    fn test_apology_mapping() {
        assert_eq!(apology_for(&IndexError::Empty.into()), APOLOGY_MESSAGE);
        assert_eq!(
            apology_for(&ToolError::Timeout("ecommerce_assistant".into()).into()),
            APOLOGY_MESSAGE
        );
        assert_eq!(
            apology_for(&LlmError::Timeout("chat".into()).into()),
            RETRY_APOLOGY_MESSAGE
        );
    }
}
