//! 测试基础设施
//!
//! 不依赖网络和真实模型即可测试各组件：
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockLlmClient`] | 替代 chat 模型：脚本化文本 / 工具调用 / 错误，记录每次请求 |
//! | [`MockEmbedder`] | 确定性的 embedding，统计调用次数（验证快照加载不重新 embedding） |
//! | [`MockTool`] | 替代真实工具，测试 Agent 的调度与容错 |
//!
//! 所有 Mock 都可以 `Clone`，克隆体共享脚本和调用记录。

mod mock_embedder;
mod mock_llm;
mod mock_tool;

pub use mock_embedder::MockEmbedder;
pub use mock_llm::MockLlmClient;
pub use mock_tool::MockTool;
