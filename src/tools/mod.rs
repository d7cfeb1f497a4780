//! 工具系统
//!
//! 定义 [`Tool`] trait 和 [`ToolManager`]（注册、按名执行、超时重试）。
//! 助手注册三个工具：
//!
//! | 工具 | 实现 |
//! |------|------|
//! | `ecommerce_assistant` | [`KnowledgeBaseTool`]：检索 + 生成 |
//! | `add_customer_note` | [`AddNoteTool`] |
//! | `get_recent_notes` | [`RecentNotesTool`] |

pub mod knowledge;
pub mod notes;

pub use knowledge::KnowledgeBaseTool;
pub use notes::{AddNoteTool, RecentNotesTool};

use crate::error::{Result, SupportError, ToolError};
use crate::llm::types::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// 工具执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }

    /// 回填给模型的文本
    pub fn content(&self) -> &str {
        if self.success {
            &self.output
        } else {
            self.error.as_deref().unwrap_or("tool failed")
        }
    }
}

/// 工具执行配置：超时与重试
#[derive(Debug, Clone)]
pub struct ToolExecutionConfig {
    /// 单次工具执行超时（毫秒）。0 = 不限制。默认 120_000
    pub timeout_ms: u64,
    /// 失败时是否自动重试。默认 false（模型调用本身已带重试）
    pub retry_on_fail: bool,
    /// `retry_on_fail=true` 时的最大重试次数。默认 2
    pub max_retries: u32,
    /// 重试前首次等待（毫秒），每次翻倍。默认 200
    pub retry_delay_ms: u64,
}

impl Default for ToolExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            retry_on_fail: false,
            max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

pub type ToolParameters = HashMap<String, serde_json::Value>;

/// 工具接口
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// 规划器根据这段描述选择工具
    fn description(&self) -> &str;
    /// 工具参数的 JSON Schema 定义
    fn parameters(&self) -> serde_json::Value;
    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult>;
}

/// 读取必填的字符串参数
pub(crate) fn required_str<'a>(parameters: &'a ToolParameters, name: &str) -> Result<&'a str> {
    match parameters.get(name) {
        None | Some(serde_json::Value::Null) => Err(ToolError::MissingParameter(name.to_string()).into()),
        Some(v) => v.as_str().ok_or_else(|| {
            ToolError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a string, got {v}"),
            }
            .into()
        }),
    }
}

/// 把 JSON 参数字符串解析为 [`ToolParameters`]；空串视为无参数
pub fn parse_arguments(tool: &str, arguments: &str) -> Result<ToolParameters> {
    if arguments.trim().is_empty() {
        return Ok(ToolParameters::new());
    }
    serde_json::from_str(arguments).map_err(|e| {
        crate::error::ParseError::InvalidArguments {
            tool: tool.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

#[derive(Default)]
pub struct ToolManager {
    tools: HashMap<String, Box<dyn Tool>>,
    config: ToolExecutionConfig,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_config(config: ToolExecutionConfig) -> Self {
        Self {
            tools: HashMap::new(),
            config,
        }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn register_tools(&mut self, tools: Vec<Box<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// 已注册的工具名，按字母序
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get_tool(&self, tool_name: &str) -> Option<&dyn Tool> {
        self.tools.get(tool_name).map(|tool| &**tool)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 发给模型的工具定义，按名称排序保证请求稳定
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.list_tools()
            .into_iter()
            .filter_map(|name| self.get_tool(name))
            .map(ToolDefinition::from_tool)
            .collect()
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: ToolParameters,
    ) -> Result<ToolResult> {
        let tool = self
            .get_tool(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let max_retries = if self.config.retry_on_fail {
            self.config.max_retries
        } else {
            0
        };

        let mut attempt = 0u32;
        loop {
            debug!(tool = tool_name, attempt, "🔧 执行工具");
            let result = if self.config.timeout_ms > 0 {
                match tokio::time::timeout(
                    Duration::from_millis(self.config.timeout_ms),
                    tool.execute(parameters.clone()),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(ToolError::Timeout(tool_name.to_string()).into()),
                }
            } else {
                tool.execute(parameters.clone()).await
            };

            match result {
                Ok(r) => return Ok(r),
                Err(e) if attempt < max_retries && !is_input_error(&e) => {
                    attempt += 1;
                    let delay_ms = self.config.retry_delay_ms * (1u64 << (attempt - 1).min(5));
                    warn!(tool = tool_name, attempt, error = %e, "工具执行失败，准备重试");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 参数错误重试也不会成功
fn is_input_error(err: &SupportError) -> bool {
    matches!(
        err,
        SupportError::Tool(ToolError::MissingParameter(_))
            | SupportError::Tool(ToolError::InvalidParameter { .. })
            | SupportError::Parse(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTool;

    #[tokio::test]
    async fn test_definitions_sorted_by_name() {
        let mut manager = ToolManager::new();
        manager.register(Box::new(MockTool::new("get_recent_notes")));
        manager.register(Box::new(MockTool::new("ecommerce_assistant")));
        manager.register(Box::new(MockTool::new("add_customer_note")));

        let names: Vec<String> = manager
            .get_tool_definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(
            names,
            vec!["add_customer_note", "ecommerce_assistant", "get_recent_notes"]
        );
    }

    #[tokio::test]
    async fn test_input_errors_are_not_retried() {
        let tool = MockTool::new("strict").with_response("never reached");
        let handle = tool.clone();
        let mut manager = ToolManager::new_with_config(ToolExecutionConfig {
            retry_on_fail: true,
            retry_delay_ms: 1,
            ..Default::default()
        });
        manager.register(Box::new(tool.requiring("content")));

        let err = manager
            .execute_tool("strict", ToolParameters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Tool(ToolError::MissingParameter(_))));
        assert_eq!(handle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let manager = ToolManager::new();
        let err = manager
            .execute_tool("refund_everything", ToolParameters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Tool(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_retry_on_fail() -> Result<()> {
        let tool = MockTool::new("flaky")
            .with_error("connection reset")
            .with_response("ok");
        let handle = tool.clone();

        let mut manager = ToolManager::new_with_config(ToolExecutionConfig {
            retry_on_fail: true,
            retry_delay_ms: 1,
            ..Default::default()
        });
        manager.register(Box::new(tool));

        let result = manager.execute_tool("flaky", ToolParameters::new()).await?;
        assert_eq!(result.output, "ok");
        assert_eq!(handle.call_count(), 2);
        Ok(())
    }

    #[test]
    fn test_parse_arguments() {
        let params = parse_arguments("get_recent_notes", r#"{"limit": 2}"#).unwrap();
        assert_eq!(params["limit"], 2);
        assert!(parse_arguments("get_recent_notes", "").unwrap().is_empty());
        assert!(matches!(
            parse_arguments("get_recent_notes", "{oops"),
            Err(SupportError::Parse(_))
        ));
    }
}
