//! Embedding 协作方与向量工具函数
//!
//! - [`Embedder`]：把文本映射为定长向量，构建索引与每次检索都通过它
//! - [`OpenAiEmbedder`]：OpenAI 兼容 `/embeddings` 接口的实现
//! - [`cosine_similarity`]：检索使用的相似度度量
//! - [`encode_vector`] / [`decode_vector`]：快照中向量的无损编码

mod openai;

pub use openai::OpenAiEmbedder;

use crate::error::{LlmError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// 文本向量化接口
///
/// 构建索引与检索查询必须使用同一个实现（同一向量空间），
/// [`model_name`](Embedder::model_name) 会写入快照用于一致性校验。
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 模型标识（如 `text-embedding-3-small`）
    fn model_name(&self) -> &str;

    /// 批量向量化，返回顺序与输入一致
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| LlmError::InvalidResponse("empty embedding response".to_string()).into())
    }
}

/// 余弦相似度，取值 `[-1.0, 1.0]`
///
/// 空向量、长度不一致或零向量时返回 `0.0`。
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// 把向量编码为 base64（小端 f32 字节），保证读回后逐位一致
pub fn encode_vector(vec: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// [`encode_vector`] 的逆过程；字节数不是 4 的倍数时返回 `None`
pub fn decode_vector(encoded: &str) -> Option<Vec<f32>> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_codec_is_bit_exact() {
        let v = vec![0.1f32, -2.5, 3.125, 0.0, -0.001, f32::MIN_POSITIVE, 1.0 / 3.0];
        let restored = decode_vector(&encode_vector(&v)).unwrap();
        assert_eq!(
            v.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            restored.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_vector("not base64 !!").is_none());
        // 3 个字节，无法组成 f32
        assert!(decode_vector(&STANDARD.encode([1u8, 2, 3])).is_none());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
