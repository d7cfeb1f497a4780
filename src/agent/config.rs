//! Agent 配置

use crate::config::AppConfig;
use crate::prompt;
use crate::tools::ToolExecutionConfig;

/// 每轮如何选择工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// 由模型根据工具描述规划调用（可连续调用多个工具）
    #[default]
    Planner,
    /// 跳过规划，问题直接交给知识库工具；结果可复现，便于测试和排查
    Direct,
}

/// Agent 运行时配置
///
/// 通过构建器链式调用设置各项参数，再传入 [`SupportAgent::new`](crate::agent::SupportAgent::new)。
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub(crate) agent_name: String,
    pub(crate) system_prompt: String,
    /// 单轮内规划器最多调用模型的次数，防止死循环
    pub(crate) max_iterations: usize,
    pub(crate) dispatch: DispatchMode,
    /// 工具执行配置：超时、重试
    pub(crate) tool_execution: ToolExecutionConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("shopdesk", &prompt::planner_system_prompt())
    }
}

impl AgentConfig {
    pub fn new(agent_name: &str, system_prompt: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            system_prompt: system_prompt.to_string(),
            max_iterations: 10,
            dispatch: DispatchMode::default(),
            tool_execution: ToolExecutionConfig::default(),
        }
    }

    /// 使用应用配置中的迭代上限和请求超时
    pub fn from_app(config: &AppConfig) -> Self {
        // 知识库工具内部还有检索和一次完整的模型调用（含重试）
        let attempts = config.request.max_retries as u64 + 2;
        Self::default()
            .max_iterations(config.max_iterations)
            .tool_execution(ToolExecutionConfig {
                timeout_ms: config.request.timeout_secs.saturating_mul(1000 * attempts),
                ..Default::default()
            })
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn agent_name(mut self, agent_name: &str) -> Self {
        self.agent_name = agent_name.to_string();
        self
    }

    pub fn system_prompt(mut self, system_prompt: &str) -> Self {
        self.system_prompt = system_prompt.to_string();
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// 设置工具执行配置（超时、重试）
    pub fn tool_execution(mut self, config: ToolExecutionConfig) -> Self {
        self.tool_execution = config;
        self
    }

    pub fn get_max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn get_dispatch(&self) -> DispatchMode {
        self.dispatch
    }
}
