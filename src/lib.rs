pub mod agent;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod rag;
pub mod repl;
pub mod testing;
pub mod tools;

pub mod prelude {
    pub use crate::agent::{AgentConfig, AgentEvent, AgentState, DispatchMode, SupportAgent};
    pub use crate::config::{AppConfig, StalenessPolicy};
    pub use crate::embedding::Embedder;
    pub use crate::error::{Result, SupportError};
    pub use crate::llm::LlmClient;
    pub use crate::memory::{ChatMemory, NotesStore, SharedMemory};
    pub use crate::rag::{DocumentLoader, IndexStore, Retriever};
    pub use crate::tools::{Tool, ToolParameters, ToolResult};
}
