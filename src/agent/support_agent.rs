//! 客服 Agent：规划器选择工具、执行、写回对话记忆

use crate::agent::{AgentConfig, AgentEvent, AgentState, DispatchMode, apology_for};
use crate::error::{AgentError, Result, SupportError, ToolError};
use crate::llm::LlmClient;
use crate::llm::types::{Message, StreamAccumulator, ToolCall, ToolDefinition};
use crate::memory::{ConversationTurn, Role, SharedMemory};
use crate::tools::{Tool, ToolManager, ToolParameters, knowledge, parse_arguments};
use async_stream::{stream, try_stream};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 客服 Agent
///
/// 持有规划用的模型、已注册的工具和共享的对话记忆；索引、备注存储等依赖
/// 都在启动时构造好再通过工具注入，没有进程级全局状态。
///
/// 每轮成功后依次追加用户轮和助手轮到记忆中；失败的轮次不写入记忆。
pub struct SupportAgent {
    config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    tool_manager: ToolManager,
    memory: SharedMemory,
    state: AgentState,
}

impl SupportAgent {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmClient>, memory: SharedMemory) -> Self {
        let tool_manager = ToolManager::new_with_config(config.tool_execution.clone());
        Self {
            config,
            llm,
            tool_manager,
            memory,
            state: AgentState::Idle,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Box<dyn Tool>>) -> Self {
        self.tool_manager.register_tools(tools);
        self
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tool_manager.register(tool);
    }

    pub fn list_tools(&self) -> Vec<&str> {
        self.tool_manager.list_tools()
    }

    pub fn name(&self) -> &str {
        &self.config.agent_name
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn memory(&self) -> SharedMemory {
        self.memory.clone()
    }

    /// 进入 `AwaitingInput`，交互循环在读取下一行之前调用
    pub fn await_input(&mut self) {
        self.transition(AgentState::AwaitingInput);
    }

    /// 进入终止状态，之后的请求都返回 [`AgentError::ShutDown`]
    pub fn shutdown(&mut self) {
        info!(agent = %self.config.agent_name, "👋 Agent 关闭");
        self.state = AgentState::Shutdown;
    }

    /// 清空对话记忆
    pub async fn reset(&self) {
        self.memory.write().await.reset();
        info!("🧹 对话记忆已清空");
    }

    fn transition(&mut self, next: AgentState) {
        if self.state == AgentState::Shutdown || self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "状态切换");
        self.state = next;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == AgentState::Shutdown {
            return Err(AgentError::ShutDown.into());
        }
        Ok(())
    }

    /// 处理一轮问答，失败时转换为固定的道歉文本，交互循环不会因此中断
    pub async fn respond(&mut self, query: &str) -> String {
        match self.chat(query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "本轮处理失败");
                apology_for(&e).to_string()
            }
        }
    }

    /// 处理一轮问答并写回记忆
    pub async fn chat(&mut self, query: &str) -> Result<String> {
        self.ensure_running()?;
        let query = query.trim();

        let outcome = match self.config.dispatch {
            DispatchMode::Planner => self.plan(query).await,
            DispatchMode::Direct => self.dispatch(knowledge::NAME, direct_params(query)).await,
        };

        match outcome {
            Ok(answer) => {
                self.commit(query, &answer).await;
                self.transition(AgentState::ResponseReady);
                Ok(answer)
            }
            Err(e) => {
                self.transition(AgentState::AwaitingInput);
                Err(e)
            }
        }
    }

    /// 按名称直接调用工具，不经过规划器，也不写入对话记忆
    pub async fn dispatch(&mut self, tool_name: &str, params: ToolParameters) -> Result<String> {
        self.ensure_running()?;
        self.transition(AgentState::ToolSelection);
        self.transition(AgentState::ToolExecution);
        info!(tool = tool_name, "🎯 直接调用工具");

        let result = match self.tool_manager.execute_tool(tool_name, params).await {
            Ok(result) => result,
            Err(e) => {
                self.transition(AgentState::AwaitingInput);
                return Err(e);
            }
        };
        if !result.success {
            self.transition(AgentState::AwaitingInput);
            return Err(ToolError::ExecutionFailed {
                tool: tool_name.to_string(),
                message: result.content().to_string(),
            }
            .into());
        }

        self.transition(AgentState::ResponseReady);
        Ok(result.output)
    }

    /// 流式处理一轮问答：文本增量以 [`AgentEvent::Token`] 实时产出，
    /// 最后产出 [`AgentEvent::FinalAnswer`] 并写回记忆
    ///
    /// 出错时先回到 `AwaitingInput` 再产出错误，调用方收到错误后立即丢弃流也不影响状态。
    pub fn chat_stream<'a>(&'a mut self, query: &'a str) -> BoxStream<'a, Result<AgentEvent>> {
        Box::pin(stream! {
            let mut turn = Box::pin(self.stream_turn(query.trim()));
            let failure = loop {
                match turn.next().await {
                    Some(Ok(event)) => yield Ok(event),
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            };
            drop(turn);
            if let Some(e) = failure {
                self.transition(AgentState::AwaitingInput);
                yield Err(e);
            }
        })
    }

    fn stream_turn<'a>(
        &'a mut self,
        query: &'a str,
    ) -> impl Stream<Item = Result<AgentEvent>> + Send + 'a {
        try_stream! {
            self.ensure_running()?;

            if self.config.dispatch == DispatchMode::Direct {
                let answer = self.dispatch(knowledge::NAME, direct_params(query)).await?;
                self.commit(query, &answer).await;
                yield AgentEvent::Token(answer.clone());
                yield AgentEvent::FinalAnswer(answer);
                return;
            }

            let mut messages = self.initial_messages(query).await;
            let tools = self.tool_definitions();
            let mut final_answer = None;

            for iteration in 0..self.config.max_iterations {
                self.transition(AgentState::ToolSelection);
                debug!(iteration = iteration + 1, "🧠 规划（流式）");

                let mut chunks = self.llm.chat_stream(messages.clone(), tools.clone()).await?;
                let mut acc = StreamAccumulator::new();
                while let Some(chunk) = chunks.next().await {
                    if let Some(text) = acc.push(&chunk?) {
                        yield AgentEvent::Token(text);
                    }
                }

                let message = acc.finish();
                if !message.has_tool_calls() {
                    final_answer = Some(final_content(message)?);
                    break;
                }

                let calls = message.tool_calls.clone().unwrap_or_default();
                messages.push(message);
                for call in calls {
                    yield AgentEvent::ToolCall {
                        name: call.function.name.clone(),
                        args: arguments_value(&call.function.arguments),
                    };
                    let output = self.execute_call(&call).await?;
                    yield AgentEvent::ToolResult {
                        name: call.function.name.clone(),
                        output: output.clone(),
                    };
                    messages.push(Message::tool_result(call.id, call.function.name, output));
                }
            }

            let answer = final_answer
                .ok_or(AgentError::MaxIterationsExceeded(self.config.max_iterations))?;
            self.commit(query, &answer).await;
            self.transition(AgentState::ResponseReady);
            yield AgentEvent::FinalAnswer(answer);
        }
    }

    /// 规划循环：模型返回工具调用就执行并回填结果，返回纯文本即为最终回答
    async fn plan(&mut self, query: &str) -> Result<String> {
        let mut messages = self.initial_messages(query).await;
        let tools = self.tool_definitions();

        for iteration in 0..self.config.max_iterations {
            self.transition(AgentState::ToolSelection);
            debug!(iteration = iteration + 1, messages = messages.len(), "🧠 规划");

            let message = self.llm.chat_with_tools(messages.clone(), tools.clone()).await?;
            if !message.has_tool_calls() {
                let answer = final_content(message)?;
                debug!(chars = answer.len(), "✅ 得到最终回答");
                return Ok(answer);
            }

            let calls = message.tool_calls.clone().unwrap_or_default();
            messages.push(message);
            for call in calls {
                let output = self.execute_call(&call).await?;
                messages.push(Message::tool_result(call.id, call.function.name, output));
            }
        }

        Err(AgentError::MaxIterationsExceeded(self.config.max_iterations).into())
    }

    /// 执行模型请求的一个工具调用
    ///
    /// 参数无法解析、工具不存在、参数缺失或工具自身报告失败时，把错误文本回填给模型让它自行纠正；
    /// 其余错误（空索引、外部服务失败、超时）直接结束本轮。
    async fn execute_call(&mut self, call: &ToolCall) -> Result<String> {
        self.transition(AgentState::ToolExecution);
        let name = call.function.name.as_str();
        info!(tool = name, "🔧 规划器调用工具");

        let params = match parse_arguments(name, &call.function.arguments) {
            Ok(params) => params,
            Err(e) => {
                warn!(tool = name, error = %e, "工具参数无法解析");
                return Ok(format!("Error: {e}"));
            }
        };

        match self.tool_manager.execute_tool(name, params).await {
            Ok(result) => {
                if !result.success {
                    warn!(tool = name, error = result.content(), "工具报告失败");
                }
                Ok(result.content().to_string())
            }
            Err(e @ SupportError::Tool(
                ToolError::NotFound(_)
                | ToolError::MissingParameter(_)
                | ToolError::InvalidParameter { .. },
            )) => {
                warn!(tool = name, error = %e, "工具调用无效，反馈给模型");
                Ok(format!("Error: {e}"))
            }
            Err(e) => Err(e),
        }
    }

    async fn initial_messages(&self, query: &str) -> Vec<Message> {
        let window = self.memory.read().await.window();
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(Message::system(self.config.system_prompt.clone()));
        for turn in window {
            messages.push(match turn.role {
                Role::User => Message::user(turn.content),
                Role::Assistant => Message::assistant(turn.content),
            });
        }
        messages.push(Message::user(query.to_string()));
        messages
    }

    fn tool_definitions(&self) -> Option<Vec<ToolDefinition>> {
        if self.tool_manager.is_empty() {
            None
        } else {
            Some(self.tool_manager.get_tool_definitions())
        }
    }

    async fn commit(&self, query: &str, answer: &str) {
        let mut memory = self.memory.write().await;
        memory.append(ConversationTurn::user(query));
        memory.append(ConversationTurn::assistant(answer));
        debug!(turns = memory.turns().len(), tokens = memory.token_estimate(), "记忆已更新");
    }
}

fn direct_params(query: &str) -> ToolParameters {
    ToolParameters::from([("input".to_string(), Value::String(query.to_string()))])
}

fn final_content(message: Message) -> Result<String> {
    message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AgentError::NoResponse.into())
}

fn arguments_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
