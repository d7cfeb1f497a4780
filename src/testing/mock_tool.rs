//! Mock 工具，用于在不依赖文件系统或模型的情况下测试 Agent 的工具调度。
//!
//! ```rust
//! use shopdesk::testing::MockTool;
//! use shopdesk::tools::Tool;
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tool = MockTool::new("get_recent_notes").with_response("No notes found.");
//! let result = tool.execute(HashMap::new()).await.unwrap();
//! assert_eq!(result.output, "No notes found.");
//! assert_eq!(tool.call_count(), 1);
//! # }
//! ```

use crate::error::{Result, ToolError};
use crate::tools::{Tool, ToolParameters, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum MockToolResponse {
    Success(String),
    /// `Ok(ToolResult::error)`，工具自己报告失败
    Failure(String),
    /// `Err(ToolError::ExecutionFailed)`
    Error(String),
}

/// 可脚本化的 Mock Tool
///
/// 按顺序返回预设结果，队列耗尽后返回 `"mock response"`。
/// `Clone` 共享同一份脚本和调用记录，注册进 [`ToolManager`](crate::tools::ToolManager)
/// 之后仍可通过克隆体观察调用情况。
#[derive(Clone)]
pub struct MockTool {
    name: String,
    description: String,
    parameters: Value,
    required: Vec<String>,
    responses: Arc<Mutex<VecDeque<MockToolResponse>>>,
    calls: Arc<Mutex<Vec<ToolParameters>>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "A mock tool for testing".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            required: Vec::new(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 声明必填参数，缺失时返回 `MissingParameter`
    pub fn requiring(mut self, param: impl Into<String>) -> Self {
        let param = param.into();
        self.parameters["properties"][param.as_str()] = json!({ "type": "string" });
        self.required.push(param);
        self.parameters["required"] = json!(self.required);
        self
    }

    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(MockToolResponse::Success(text.into()))
    }

    pub fn with_failure(self, msg: impl Into<String>) -> Self {
        self.push(MockToolResponse::Failure(msg.into()))
    }

    pub fn with_error(self, msg: impl Into<String>) -> Self {
        self.push(MockToolResponse::Error(msg.into()))
    }

    fn push(self, response: MockToolResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Option<ToolParameters> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, params: ToolParameters) -> Result<ToolResult> {
        self.calls.lock().unwrap().push(params.clone());

        if let Some(missing) = self.required.iter().find(|p| !params.contains_key(*p)) {
            return Err(ToolError::MissingParameter(missing.clone()).into());
        }

        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(MockToolResponse::Success(text)) => Ok(ToolResult::success(text)),
            Some(MockToolResponse::Failure(msg)) => Ok(ToolResult::error(msg)),
            Some(MockToolResponse::Error(msg)) => Err(ToolError::ExecutionFailed {
                tool: self.name.clone(),
                message: msg,
            }
            .into()),
            None => Ok(ToolResult::success("mock response".to_string())),
        }
    }
}
