//! 生成式模型协作方
//!
//! - [`chat`] / [`stream_chat`]：OpenAI 兼容 `/chat/completions` 的底层调用
//! - [`LlmClient`]：Agent、知识库工具依赖的抽象接口，测试时用
//!   [`MockLlmClient`](crate::testing::MockLlmClient) 替换
//! - [`DefaultLlmClient`]：带超时与指数退避重试的默认实现

mod client;
pub mod config;
pub mod types;

pub(crate) use client::post_json;

use crate::config::RequestPolicy;
use crate::error::{LlmError, Result, SupportError};
use crate::llm::client::{post, post_stream};
use crate::llm::config::ModelConfig;
use crate::llm::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Message, ToolDefinition,
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub fn assemble_req_header(model: &ModelConfig) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();

    header_map.insert(
        "Authorization",
        format!("Bearer {}", model.apikey)
            .parse()
            .map_err(|e| SupportError::Other(format!("Invalid Authorization header: {}", e)))?,
    );
    header_map.insert(
        "Content-Type",
        "application/json"
            .parse()
            .map_err(|e| SupportError::Other(format!("Invalid Content-Type header: {}", e)))?,
    );
    Ok(header_map)
}

/// 构造共享的 HTTP 客户端，只限制建连时间；整体超时由调用方按请求控制
pub fn build_http_client(policy: &RequestPolicy) -> Result<Arc<Client>> {
    let client = Client::builder()
        .connect_timeout(policy.timeout())
        .build()?;
    Ok(Arc::new(client))
}

pub async fn chat(
    client: Arc<Client>,
    model: &ModelConfig,
    messages: Vec<Message>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    tools: Option<Vec<ToolDefinition>>,
) -> Result<ChatCompletionResponse> {
    let tool_choice = tools.as_ref().map(|_| "auto".to_string());
    let request_body = ChatCompletionRequest {
        model: model.model.clone(),
        messages,
        temperature,
        max_tokens,
        stream: Some(false),
        tools,
        tool_choice,
    };

    let header_map = assemble_req_header(model)?;
    post(client, &request_body, header_map, &model.chat_url()).await
}

pub async fn stream_chat(
    client: Arc<Client>,
    model: &ModelConfig,
    messages: Vec<Message>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    tools: Option<Vec<ToolDefinition>>,
) -> Result<BoxStream<'static, Result<ChatCompletionChunk>>> {
    let tool_choice = tools.as_ref().map(|_| "auto".to_string());
    let request_body = ChatCompletionRequest {
        model: model.model.clone(),
        messages,
        temperature,
        max_tokens,
        stream: Some(true),
        tools,
        tool_choice,
    };

    let header_map = assemble_req_header(model)?;
    let stream = post_stream(client, &request_body, header_map, &model.chat_url()).await?;
    Ok(stream.boxed())
}

/// 带超时的有限次重试：仅对 [`SupportError::is_retryable`] 的错误重试，
/// 等待时间按 [`RequestPolicy::backoff`] 指数增长
pub async fn with_retry<T, F, Fut>(policy: &RequestPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(format!(
                "{label} exceeded {}s",
                policy.timeout_secs
            ))
            .into()),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!(
                    call = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "⏳ 调用失败，准备重试"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// 流建立之后，相邻两个 chunk 之间的等待同样受 `limit` 约束；
/// 超时产出 [`LlmError::Timeout`] 并结束流
pub fn with_idle_timeout<T, S>(stream: S, limit: Duration, label: &str) -> BoxStream<'static, Result<T>>
where
    T: Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
{
    let message = format!("{label} received nothing for {}ms", limit.as_millis());
    let guarded = try_stream! {
        let mut stream = Box::pin(stream);
        loop {
            match tokio::time::timeout(limit, stream.next()).await {
                Ok(Some(item)) => yield item?,
                Ok(None) => break,
                Err(_) => {
                    warn!(call = %message, "⏱️ 流式响应中断");
                    Err::<(), SupportError>(LlmError::Timeout(message.clone()).into())?;
                }
            }
        }
    };
    guarded.boxed()
}

/// Agent、知识库工具使用的 LLM 调用接口
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// 一次完整调用，返回 assistant 消息（可能携带工具调用）
    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message>;

    /// 流式调用，逐个返回增量 chunk
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<BoxStream<'static, Result<ChatCompletionChunk>>>;

    /// 发起一次简单的无工具对话，返回模型的文本内容
    async fn chat_simple(&self, messages: Vec<Message>) -> Result<String> {
        let message = self.chat_with_tools(messages, None).await?;
        message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse.into())
    }
}

/// 基于 [`chat`] / [`stream_chat`] 的默认实现
pub struct DefaultLlmClient {
    client: Arc<Client>,
    model: ModelConfig,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    policy: RequestPolicy,
}

impl DefaultLlmClient {
    pub fn new(client: Arc<Client>, model: ModelConfig, policy: RequestPolicy) -> Self {
        Self {
            client,
            model,
            temperature: None,
            max_tokens: Some(1024),
            policy,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
impl LlmClient for DefaultLlmClient {
    fn model_name(&self) -> &str {
        &self.model.model
    }

    async fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message> {
        let response = with_retry(&self.policy, "chat", || {
            chat(
                self.client.clone(),
                &self.model,
                messages.clone(),
                self.temperature,
                self.max_tokens,
                tools.clone(),
            )
        })
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::EmptyResponse.into())
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<BoxStream<'static, Result<ChatCompletionChunk>>> {
        // 只对建立连接的阶段重试；流开始后不再重放，避免重复输出
        let stream = with_retry(&self.policy, "chat_stream", || {
            stream_chat(
                self.client.clone(),
                &self.model,
                messages.clone(),
                self.temperature,
                self.max_tokens,
                tools.clone(),
            )
        })
        .await?;
        Ok(with_idle_timeout(stream, self.policy.timeout(), "chat_stream"))
    }
}
