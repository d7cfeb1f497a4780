//! `ecommerce_assistant`：检索知识库并据此生成回答

use crate::error::Result;
use crate::llm::LlmClient;
use crate::llm::types::Message;
use crate::memory::SharedMemory;
use crate::prompt::{self, NOT_FOUND_MESSAGE, SYSTEM_PROMPT};
use crate::rag::Retriever;
use crate::tools::{Tool, ToolParameters, ToolResult, required_str};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "ecommerce_assistant";

pub struct KnowledgeBaseTool {
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmClient>,
    memory: SharedMemory,
    top_k: usize,
    similarity_floor: Option<f32>,
}

impl KnowledgeBaseTool {
    pub fn new(retriever: Arc<Retriever>, llm: Arc<dyn LlmClient>, memory: SharedMemory) -> Self {
        Self {
            retriever,
            llm,
            memory,
            top_k: crate::rag::retriever::DEFAULT_TOP_K,
            similarity_floor: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// 低于该分数的 chunk 不算命中；没有命中时直接返回固定的“信息不足”回答
    pub fn similarity_floor(mut self, floor: Option<f32>) -> Self {
        self.similarity_floor = floor;
        self
    }

    /// 检索 → 组装 prompt → 调用模型
    pub async fn answer(&self, query: &str) -> Result<String> {
        let mut hits = self.retriever.retrieve(query, self.top_k).await?;
        if let Some(floor) = self.similarity_floor {
            hits.retain(|h| h.score >= floor);
        }
        if hits.is_empty() {
            info!(query, "知识库中没有足够相关的内容");
            return Ok(NOT_FOUND_MESSAGE.to_string());
        }

        let window = self.memory.read().await.window();
        let prompt = prompt::assemble(&hits, &window, query);
        debug!(
            hits = hits.len(),
            history_turns = window.len(),
            prompt_chars = prompt.len(),
            "📨 知识库 prompt 已组装"
        );

        self.llm
            .chat_simple(vec![
                Message::system(SYSTEM_PROMPT.to_string()),
                Message::user(prompt),
            ])
            .await
    }
}

#[async_trait::async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Use this tool to get information about products, prices, features, availability, shipping policies, and return policies."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The customer's question, rephrased as a standalone query"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, parameters: ToolParameters) -> Result<ToolResult> {
        let query = required_str(&parameters, "input")?;
        Ok(ToolResult::success(self.answer(query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexError, SupportError};
    use crate::memory::{ChatMemory, ConversationTurn};
    use crate::rag::{Index, IndexStore, IndexedChunk};
    use crate::rag::loader::DocumentLoader;
    use crate::testing::{MockEmbedder, MockLlmClient};
    use std::collections::HashMap;

    async fn ultraphone_retriever(embedder: Arc<MockEmbedder>) -> Result<Arc<Retriever>> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        std::fs::write(data.path().join("products.txt"), "The UltraPhone X costs $799.")?;
        let index = IndexStore::new(store_dir.path(), embedder.clone())
            .get_index(&DocumentLoader::new(data.path()))
            .await?;
        Ok(Arc::new(Retriever::new(Arc::new(index), embedder)))
    }

    #[tokio::test]
    async fn test_prompt_carries_context_history_and_query() -> Result<()> {
        let embedder = Arc::new(MockEmbedder::new(64));
        let retriever = ultraphone_retriever(embedder).await?;
        let llm = MockLlmClient::new().with_response("The UltraPhone X costs $799.");
        let memory = ChatMemory::shared(2500);
        memory
            .write()
            .await
            .append(ConversationTurn::user("Hi, I'm shopping for a phone."));

        let tool = KnowledgeBaseTool::new(retriever, Arc::new(llm.clone()), memory);
        let mut params = HashMap::new();
        params.insert("input".to_string(), json!("How much does the UltraPhone X cost?"));
        let result = tool.execute(params).await?;

        assert_eq!(result.output, "The UltraPhone X costs $799.");
        let sent = llm.last_messages().unwrap();
        let prompt = sent[1].content.as_deref().unwrap();
        assert!(prompt.contains("The UltraPhone X costs $799."));
        assert!(prompt.contains("User: Hi, I'm shopping for a phone."));
        assert!(prompt.contains("Current Customer Question: How much does the UltraPhone X cost?"));
        Ok(())
    }

    #[tokio::test]
    async fn test_floor_returns_not_found_without_model_call() -> Result<()> {
        let embedder = Arc::new(MockEmbedder::new(64));
        let retriever = ultraphone_retriever(embedder).await?;
        let llm = MockLlmClient::new();
        let tool = KnowledgeBaseTool::new(retriever, Arc::new(llm.clone()), ChatMemory::shared(2500))
            .similarity_floor(Some(0.99));

        let answer = tool.answer("Do you repair bicycles?").await?;
        assert_eq!(answer, NOT_FOUND_MESSAGE);
        assert_eq!(llm.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_index_and_missing_input() {
        let index = Arc::new(Index::new("mock-embedding", "h", 0, Vec::<IndexedChunk>::new()).unwrap());
        let retriever = Arc::new(Retriever::new(index, Arc::new(MockEmbedder::new(8))));
        let tool = KnowledgeBaseTool::new(
            retriever,
            Arc::new(MockLlmClient::new()),
            ChatMemory::shared(2500),
        );

        let err = tool.answer("anything").await.unwrap_err();
        assert!(matches!(err, SupportError::Index(IndexError::Empty)));

        assert!(tool.execute(HashMap::new()).await.is_err());
    }
}
