//! 向量索引与快照
//!
//! 快照是索引目录下的单个 `index.json`：记录版本、embedding 模型、维度、
//! 源文档指纹和全部 chunk，向量以 base64 小端 `f32` 存储，读回后逐位一致。
//! 写入先落到临时文件再 rename，中途失败不会留下半个快照。

use crate::config::StalenessPolicy;
use crate::embedding::{Embedder, decode_vector, encode_vector};
use crate::error::{IndexError, Result};
use crate::rag::chunk::{Chunk, chunk_document};
use crate::rag::loader::{Document, DocumentLoader, corpus_hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SNAPSHOT_FILE: &str = "index.json";
const SNAPSHOT_VERSION: u32 = 1;

/// 带向量的 chunk
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// 内存中的索引，构建或加载后不再修改
#[derive(Debug, Clone)]
pub struct Index {
    embedding_model: String,
    dims: usize,
    source_hash: String,
    built_at: DateTime<Utc>,
    documents: usize,
    entries: Vec<IndexedChunk>,
}

impl Index {
    /// 所有向量必须同维
    pub fn new(
        embedding_model: impl Into<String>,
        source_hash: impl Into<String>,
        documents: usize,
        entries: Vec<IndexedChunk>,
    ) -> Result<Self> {
        let dims = entries.first().map_or(0, |e| e.embedding.len());
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dims) {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: bad.embedding.len(),
            }
            .into());
        }
        Ok(Self {
            embedding_model: embedding_model.into(),
            dims,
            source_hash: source_hash.into(),
            built_at: Utc::now(),
            documents,
            entries,
        })
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    /// 原子地写入 `<dir>/index.json`，目录不存在时创建
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dims: self.dims,
            source_hash: self.source_hash.clone(),
            built_at: self.built_at,
            documents: self.documents,
            chunks: self
                .entries
                .iter()
                .map(|e| SnapshotChunk {
                    chunk: e.chunk.clone(),
                    embedding: encode_vector(&e.embedding),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let target = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &target).await?;

        info!(path = %target.display(), chunks = self.len(), "💾 索引快照已保存");
        Ok(())
    }

    /// 读取 `<dir>/index.json`；不可读或结构无效时返回 [`IndexError::Corrupt`]
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SNAPSHOT_FILE);
        let corrupt = |message: String| IndexError::Corrupt {
            path: path.display().to_string(),
            message,
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| corrupt(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(corrupt(format!("unsupported snapshot version {}", snapshot.version)).into());
        }

        let mut entries = Vec::with_capacity(snapshot.chunks.len());
        for item in snapshot.chunks {
            let embedding = decode_vector(&item.embedding)
                .ok_or_else(|| corrupt(format!("bad embedding for chunk {}", item.chunk.id)))?;
            if embedding.len() != snapshot.dims {
                return Err(corrupt(format!(
                    "chunk {} has {} dims, expected {}",
                    item.chunk.id,
                    embedding.len(),
                    snapshot.dims
                ))
                .into());
            }
            entries.push(IndexedChunk {
                chunk: item.chunk,
                embedding,
            });
        }

        debug!(path = %path.display(), chunks = entries.len(), "读取索引快照");
        Ok(Self {
            embedding_model: snapshot.embedding_model,
            dims: snapshot.dims,
            source_hash: snapshot.source_hash,
            built_at: snapshot.built_at,
            documents: snapshot.documents,
            entries,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    embedding_model: String,
    dims: usize,
    source_hash: String,
    built_at: DateTime<Utc>,
    documents: usize,
    chunks: Vec<SnapshotChunk>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotChunk {
    #[serde(flatten)]
    chunk: Chunk,
    embedding: String,
}

/// 索引的构建、持久化与加载
///
/// 索引目录存在时只加载快照，从不重新计算 embedding；
/// 只有首次使用（或 [`StalenessPolicy::Rebuild`] 发现源文档变化）才会构建。
pub struct IndexStore {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunk_tokens: usize,
    staleness: StalenessPolicy,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            chunk_tokens: 256,
            staleness: StalenessPolicy::default(),
        }
    }

    pub fn chunk_tokens(mut self, chunk_tokens: usize) -> Self {
        self.chunk_tokens = chunk_tokens.max(1);
        self
    }

    pub fn staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 只有 `index.json` 存在才算有快照；空目录或中途失败留下的目录会重新构建
    pub fn snapshot_exists(&self) -> bool {
        self.dir.join(SNAPSHOT_FILE).is_file()
    }

    /// 切分、向量化并立即持久化
    pub async fn build(&self, documents: &[Document]) -> Result<Index> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunk_document(doc, self.chunk_tokens))
            .collect();
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "🔨 开始构建索引"
        );

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            self.embedder.embed_batch(&texts).await?
        };
        if embeddings.len() != chunks.len() {
            return Err(crate::error::LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            ))
            .into());
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        let index = Index::new(
            self.embedder.model_name(),
            corpus_hash(documents),
            documents.len(),
            entries,
        )?;
        index.persist(&self.dir).await?;
        Ok(index)
    }

    /// 加载快照，并确认它与当前 embedder 处于同一向量空间
    pub async fn load(&self) -> Result<Index> {
        let index = Index::load(&self.dir).await?;
        if index.embedding_model() != self.embedder.model_name() {
            return Err(IndexError::ModelMismatch {
                index: index.embedding_model().to_string(),
                embedder: self.embedder.model_name().to_string(),
            }
            .into());
        }
        info!(
            dir = %self.dir.display(),
            chunks = index.len(),
            built_at = %index.built_at(),
            "📦 已加载索引快照"
        );
        Ok(index)
    }

    /// 有快照就加载，没有就从 `loader` 读取文档构建
    pub async fn get_index(&self, loader: &DocumentLoader) -> Result<Index> {
        if !self.snapshot_exists() {
            let documents = loader.load()?;
            return self.build(&documents).await;
        }

        let index = self.load().await?;
        if self.staleness == StalenessPolicy::Ignore {
            return Ok(index);
        }

        let documents = match loader.load() {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "无法读取源文档，跳过快照新鲜度检查");
                return Ok(index);
            }
        };
        if corpus_hash(&documents) == index.source_hash() {
            return Ok(index);
        }

        match self.staleness {
            StalenessPolicy::Rebuild => {
                info!(dir = %self.dir.display(), "源文档已变化，重建索引");
                self.build(&documents).await
            }
            _ => {
                warn!(
                    dir = %self.dir.display(),
                    "⚠️ 源文档已在快照之后变化，继续使用旧快照（可运行 `shopdesk index --rebuild`）"
                );
                Ok(index)
            }
        }
    }

    /// 无论快照是否存在都重新构建
    pub async fn rebuild(&self, loader: &DocumentLoader) -> Result<Index> {
        let documents = loader.load()?;
        self.build(&documents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupportError;
    use crate::testing::MockEmbedder;
    use std::fs;

    fn corpus(dir: &Path) {
        fs::write(dir.join("products.txt"), "The UltraPhone X costs $799.").unwrap();
        fs::write(
            dir.join("shipping.txt"),
            "Standard shipping is $4.99 and takes 3-5 days.\n\nExpress shipping is $12.99.",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_first_use_builds_and_persists() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        corpus(data.path());
        let index_dir = store_dir.path().join("text_data");

        let embedder = Arc::new(MockEmbedder::new(32));
        let store = IndexStore::new(&index_dir, embedder.clone());
        let index = store.get_index(&DocumentLoader::new(data.path())).await?;

        assert_eq!(index.documents(), 2);
        assert_eq!(index.dims(), 32);
        assert!(index_dir.join(SNAPSHOT_FILE).exists());
        assert!(!index_dir.join("index.json.tmp").exists());
        assert_eq!(embedder.embedded_count(), index.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_snapshot_is_never_re_embedded() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        corpus(data.path());
        let loader = DocumentLoader::new(data.path());

        let built = IndexStore::new(store_dir.path(), Arc::new(MockEmbedder::new(16)))
            .get_index(&loader)
            .await?;

        for policy in [
            StalenessPolicy::Ignore,
            StalenessPolicy::Warn,
            StalenessPolicy::Rebuild,
        ] {
            let embedder = Arc::new(MockEmbedder::new(16));
            let store = IndexStore::new(store_dir.path(), embedder.clone()).staleness(policy);
            let loaded = store.get_index(&loader).await?;
            assert_eq!(embedder.call_count(), 0, "{policy:?} 不应重新 embedding");
            assert_eq!(loaded.entries(), built.entries());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_snapshot_policies() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        corpus(data.path());
        let loader = DocumentLoader::new(data.path());
        IndexStore::new(store_dir.path(), Arc::new(MockEmbedder::new(16)))
            .get_index(&loader)
            .await?;

        fs::write(data.path().join("returns.txt"), "Laptops can be returned within 30 days.")?;

        let embedder = Arc::new(MockEmbedder::new(16));
        let warned = IndexStore::new(store_dir.path(), embedder.clone())
            .get_index(&loader)
            .await?;
        assert_eq!(warned.documents(), 2);
        assert_eq!(embedder.call_count(), 0);

        let rebuilt = IndexStore::new(store_dir.path(), embedder.clone())
            .staleness(StalenessPolicy::Rebuild)
            .get_index(&loader)
            .await?;
        assert_eq!(rebuilt.documents(), 3);
        assert!(embedder.call_count() > 0);

        let reloaded = Index::load(store_dir.path()).await?;
        assert_eq!(reloaded.source_hash(), rebuilt.source_hash());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_fatal() {
        let store_dir = tempfile::tempdir().unwrap();
        fs::write(store_dir.path().join(SNAPSHOT_FILE), "{ not json").unwrap();
        let data = tempfile::tempdir().unwrap();
        corpus(data.path());

        let store = IndexStore::new(store_dir.path(), Arc::new(MockEmbedder::new(8)));
        let err = store
            .get_index(&DocumentLoader::new(data.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Index(IndexError::Corrupt { .. })));
        assert!(err.is_startup_fatal());
    }

    #[tokio::test]
    async fn test_existing_dir_without_manifest_is_built() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        corpus(data.path());
        // 上次构建在 rename 之前中断，只留下临时文件
        fs::write(store_dir.path().join("index.json.tmp"), "{ half")?;

        let embedder = Arc::new(MockEmbedder::new(8));
        let store = IndexStore::new(store_dir.path(), embedder.clone());
        assert!(!store.snapshot_exists());

        let index = store.get_index(&DocumentLoader::new(data.path())).await?;
        assert_eq!(index.documents(), 2);
        assert!(embedder.call_count() > 0);
        assert!(store.snapshot_exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_load_without_manifest_is_corrupt() {
        let store_dir = tempfile::tempdir().unwrap();
        let err = IndexStore::new(store_dir.path(), Arc::new(MockEmbedder::new(8)))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::Index(IndexError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_model_mismatch_is_rejected() -> Result<()> {
        let data = tempfile::tempdir()?;
        let store_dir = tempfile::tempdir()?;
        corpus(data.path());
        IndexStore::new(store_dir.path(), Arc::new(MockEmbedder::new(8)))
            .get_index(&DocumentLoader::new(data.path()))
            .await?;

        let other = Arc::new(MockEmbedder::new(8).with_model_name("another-model"));
        let err = IndexStore::new(store_dir.path(), other).load().await.unwrap_err();
        assert!(matches!(
            err,
            SupportError::Index(IndexError::ModelMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let chunk = |i: usize| Chunk {
            id: format!("d#{i}"),
            document_id: "d".into(),
            chunk_index: i,
            text: format!("t{i}"),
            hash: String::new(),
        };
        let result = Index::new(
            "m",
            "h",
            1,
            vec![
                IndexedChunk {
                    chunk: chunk(0),
                    embedding: vec![1.0, 0.0],
                },
                IndexedChunk {
                    chunk: chunk(1),
                    embedding: vec![1.0],
                },
            ],
        );
        assert!(matches!(
            result,
            Err(SupportError::Index(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }))
        ));
    }
}
