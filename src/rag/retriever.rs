//! 相似度检索
//!
//! 度量固定为余弦相似度；分数相同的 chunk 按插入顺序排列。

use crate::embedding::{Embedder, cosine_similarity};
use crate::error::{IndexError, Result};
use crate::rag::chunk::Chunk;
use crate::rag::index::{Index, IndexedChunk};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 3;

/// 检索结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct Retriever {
    index: Arc<Index>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<Index>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// [`retrieve_default`](Self::retrieve_default) 使用的 k
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// 用构建索引时的同一个 embedder 向量化查询，返回相似度最高的 k 个 chunk
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if self.index.is_empty() {
            return Err(IndexError::Empty.into());
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        if query_vec.len() != self.index.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: self.index.dims(),
                actual: query_vec.len(),
            }
            .into());
        }

        let hits = rank(self.index.entries(), &query_vec, k);
        debug!(
            k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "🔍 检索完成"
        );
        Ok(hits)
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve(query, self.top_k).await
    }
}

/// 对全部 chunk 打分并取前 k 个；分数降序，同分按原始位置升序
pub fn rank(entries: &[IndexedChunk], query: &[f32], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<(usize, f32)> = entries
        .iter()
        .enumerate()
        .map(|(pos, e)| (pos, cosine_similarity(&e.embedding, query)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(pos, score)| ScoredChunk {
            chunk: entries[pos].chunk.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupportError;
    use crate::rag::index::IndexStore;
    use crate::rag::loader::DocumentLoader;
    use crate::testing::MockEmbedder;

    fn entry(i: usize, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                id: format!("doc#{i}"),
                document_id: "doc".to_string(),
                chunk_index: i,
                text: format!("chunk {i}"),
                hash: String::new(),
            },
            embedding,
        }
    }

    fn synthetic_index() -> Arc<Index> {
        let entries = vec![
            entry(0, vec![0.0, 1.0]),  // 与查询正交
            entry(1, vec![1.0, 0.0]),  // 完全一致
            entry(2, vec![1.0, 1.0]),  // 45°
            entry(3, vec![2.0, 0.0]),  // 与 1 同向，同分
            entry(4, vec![-1.0, 0.0]), // 反向
        ];
        Arc::new(Index::new("mock-embedding", "h", 1, entries).unwrap())
    }

    fn embedder_for(query: &str) -> Arc<MockEmbedder> {
        Arc::new(MockEmbedder::new(2).with_vector(query, vec![1.0, 0.0]))
    }

    fn texts(hits: &[ScoredChunk]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_top_k_descending_with_stable_ties() -> Result<()> {
        let retriever = Retriever::new(synthetic_index(), embedder_for("q"));

        let hits = retriever.retrieve("q", 3).await?;
        assert_eq!(texts(&hits), vec!["chunk 1", "chunk 3", "chunk 2"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let all = retriever.retrieve("q", 10).await?;
        assert_eq!(
            texts(&all),
            vec!["chunk 1", "chunk 3", "chunk 2", "chunk 0", "chunk 4"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_default_k_is_three() -> Result<()> {
        let retriever = Retriever::new(synthetic_index(), embedder_for("q"));
        assert_eq!(retriever.retrieve_default("q").await?.len(), DEFAULT_TOP_K);
        assert_eq!(retriever.top_k(1).retrieve_default("q").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_index_fails() {
        let index = Arc::new(Index::new("mock-embedding", "h", 0, Vec::new()).unwrap());
        let embedder = Arc::new(MockEmbedder::new(2));
        let err = Retriever::new(index, embedder.clone())
            .retrieve("anything", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Index(IndexError::Empty)));
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let retriever = Retriever::new(synthetic_index(), Arc::new(MockEmbedder::new(3)));
        let err = retriever.retrieve("q", 1).await.unwrap_err();
        assert!(matches!(
            err,
            SupportError::Index(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_persisted_index_retrieves_identically() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        std::fs::write(
            data.path().join("catalog.txt"),
            "The UltraPhone X costs $799.\n\nAirBuds Pro support wireless charging.\n\n\
             The GamerPro 5 ships in 2 weeks.",
        )?;
        std::fs::write(
            data.path().join("policies.txt"),
            "Laptops can be returned within 30 days.\n\nShipping is free on orders over $50.",
        )?;
        let loader = DocumentLoader::new(data.path());
        let embedder = Arc::new(MockEmbedder::new(64));
        let store = IndexStore::new(store_dir.path(), embedder.clone()).chunk_tokens(8);

        let built = Arc::new(store.build(&loader.load()?).await?);
        let reloaded = Arc::new(store.load().await?);

        for query in [
            "How much does the UltraPhone X cost?",
            "Can I return a laptop?",
            "wireless charging",
        ] {
            let a = Retriever::new(built.clone(), embedder.clone())
                .retrieve(query, 3)
                .await?;
            let b = Retriever::new(reloaded.clone(), embedder.clone())
                .retrieve(query, 3)
                .await?;
            assert_eq!(a, b, "重新加载后检索结果不一致: {query}");
        }
        Ok(())
    }
}
