use crate::config::RequestPolicy;
use crate::embedding::Embedder;
use crate::error::{LlmError, Result};
use crate::llm::config::ModelConfig;
use crate::llm::{assemble_req_header, post_json, with_retry};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// OpenAI 兼容 `/embeddings` 接口
pub struct OpenAiEmbedder {
    client: Arc<Client>,
    model: ModelConfig,
    batch_size: usize,
    policy: RequestPolicy,
}

impl OpenAiEmbedder {
    pub fn new(client: Arc<Client>, model: ModelConfig, policy: RequestPolicy) -> Self {
        Self {
            client,
            model,
            batch_size: 64,
            policy,
        }
    }

    /// 单次请求携带的最大文本数
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model.model,
            input,
        };
        let header_map = assemble_req_header(&self.model)?;
        let resp: EmbeddingResponse =
            post_json(&self.client, &self.model.embeddings_url(), header_map, &body).await?;

        if resp.data.len() != input.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                resp.data.len()
            ))
            .into());
        }

        // 服务端不保证按输入顺序返回，按 index 还原
        let mut data = resp.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(model = %self.model.model, batch = batch.len(), "🔢 请求 embedding");
            let mut part = with_retry(&self.policy, "embeddings", || self.request(batch)).await?;
            vectors.append(&mut part);
        }
        Ok(vectors)
    }
}
