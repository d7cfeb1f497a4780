//! Mock LLM 客户端，按脚本返回文本、工具调用或错误，不发起 HTTP 请求。
//!
//! ```rust
//! use shopdesk::testing::MockLlmClient;
//! use shopdesk::llm::LlmClient;
//! use shopdesk::llm::types::Message;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockLlmClient::new()
//!     .with_tool_call("get_recent_notes", r#"{"limit": 1}"#)
//!     .with_response("You have one note.");
//!
//! let first = mock.chat_with_tools(vec![Message::user("notes?".into())], None).await.unwrap();
//! assert!(first.has_tool_calls());
//! let second = mock.chat_simple(vec![]).await.unwrap();
//! assert_eq!(second, "You have one note.");
//! assert_eq!(mock.call_count(), 2);
//! # }
//! ```

use crate::error::{LlmError, Result, SupportError};
use crate::llm::LlmClient;
use crate::llm::types::{
    ChatCompletionChunk, ChunkChoice, DeltaFunctionCall, DeltaMessage, DeltaToolCall, Message,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum MockLlmResponse {
    Message(Message),
    Err(SupportError),
}

/// 可脚本化的 Mock LLM 客户端
///
/// 按顺序返回预设响应；队列耗尽后返回 `EmptyResponse`。
/// 每次调用的 messages 与 tools 都会被记录。
#[derive(Clone)]
pub struct MockLlmClient {
    responses: Arc<Mutex<VecDeque<MockLlmResponse>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
    tools_seen: Arc<Mutex<Vec<Option<Vec<ToolDefinition>>>>>,
    next_call_id: Arc<Mutex<usize>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            tools_seen: Arc::new(Mutex::new(Vec::new())),
            next_call_id: Arc::new(Mutex::new(0)),
        }
    }

    /// 追加一条纯文本回答
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(MockLlmResponse::Message(Message::assistant(text.into())))
    }

    /// 追加一条发起单个工具调用的 assistant 消息
    pub fn with_tool_call(self, name: &str, arguments: &str) -> Self {
        let id = {
            let mut next = self.next_call_id.lock().unwrap();
            *next += 1;
            format!("call_{}", *next)
        };
        let call = ToolCall::function(id, name, arguments.to_string());
        self.push(MockLlmResponse::Message(Message::assistant_with_tools(vec![call])))
    }

    pub fn with_error(self, err: SupportError) -> Self {
        self.push(MockLlmResponse::Err(err))
    }

    pub fn with_network_error(self, msg: impl Into<String>) -> Self {
        self.with_error(LlmError::NetworkError(msg.into()).into())
    }

    fn push(self, response: MockLlmResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn all_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    /// 最后一次调用携带的工具定义
    pub fn last_tools(&self) -> Option<Vec<ToolDefinition>> {
        self.tools_seen.lock().unwrap().last().cloned().flatten()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    fn next(&self, messages: Vec<Message>, tools: Option<Vec<ToolDefinition>>) -> Result<Message> {
        self.calls.lock().unwrap().push(messages);
        self.tools_seen.lock().unwrap().push(tools);
        match self.responses.lock().unwrap().pop_front() {
            Some(MockLlmResponse::Message(message)) => Ok(message),
            Some(MockLlmResponse::Err(e)) => Err(e),
            None => Err(LlmError::EmptyResponse.into()),
        }
    }
}

/// 把一条完整消息拆成流式 chunk：文本按空白切分，工具调用参数分两段
fn to_chunks(message: Message) -> Vec<ChatCompletionChunk> {
    let mut chunks = Vec::new();
    if let Some(content) = &message.content {
        for piece in content.split_inclusive(' ') {
            chunks.push(ChatCompletionChunk::content(piece));
        }
    }
    for (i, call) in message.tool_calls.unwrap_or_default().into_iter().enumerate() {
        let args = call.function.arguments;
        let mid = args.char_indices().nth(args.chars().count() / 2).map_or(0, |(pos, _)| pos);
        let (head, tail) = args.split_at(mid);
        for (j, part) in [head, tail].into_iter().enumerate() {
            chunks.push(ChatCompletionChunk {
                id: String::new(),
                choices: vec![ChunkChoice {
                    delta: DeltaMessage {
                        tool_calls: Some(vec![DeltaToolCall {
                            index: i as u32,
                            id: (j == 0).then(|| call.id.clone()),
                            call_type: (j == 0).then(|| "function".to_string()),
                            function: Some(DeltaFunctionCall {
                                name: (j == 0).then(|| call.function.name.clone()),
                                arguments: Some(part.to_string()),
                            }),
                        }]),
                        ..Default::default()
                    },
                    finish_reason: None,
                    index: 0,
                }],
            });
        }
    }
    chunks
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        "mock-llm"
    }

    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message> {
        self.next(messages, tools)
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<BoxStream<'static, Result<ChatCompletionChunk>>> {
        let message = self.next(messages, tools)?;
        Ok(stream::iter(to_chunks(message).into_iter().map(Ok)).boxed())
    }
}
