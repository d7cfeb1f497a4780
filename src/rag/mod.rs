//! 检索增强（RAG）管线
//!
//! 文档目录 → [`DocumentLoader`] → [`chunk`] 切分 → [`IndexStore`] 向量化并持久化
//! → [`Retriever`] 按余弦相似度返回 top-k。

pub mod chunk;
pub mod index;
pub mod loader;
pub mod retriever;

pub use chunk::Chunk;
pub use index::{Index, IndexStore, IndexedChunk};
pub use loader::{Document, DocumentLoader};
pub use retriever::{Retriever, ScoredChunk};
