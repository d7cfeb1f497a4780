//! 段落切分
//!
//! 按空行切段，再把相邻段落合并到 `max_tokens` 以内；单段超长时在
//! 换行或空格处硬切。相同输入总是得到相同的 chunk 序列。

use crate::rag::loader::Document;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 与记忆窗口一致的估算：4 个字符约等于 1 个 token
pub const CHARS_PER_TOKEN: usize = 4;

/// 文档的一个片段，检索的基本单位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<document_id>#<chunk_index>`
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// 文本的 SHA-256
    pub hash: String,
}

/// 切分单个文档；空白文档不产生 chunk
pub fn chunk_document(document: &Document, max_tokens: usize) -> Vec<Chunk> {
    chunk_text(&document.id, &document.content, max_tokens)
}

pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document_id, i, text))
        .collect()
}

/// 超长段落按 `max_chars` 切开，尽量落在换行或空格上，且不拆开 UTF-8 字符
fn hard_split(mut remaining: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.trim().to_string());
            break;
        }
        let mut limit = max_chars;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let split_at = remaining[..limit]
            .rfind(['\n', ' '])
            .map(|pos| pos + 1)
            .filter(|pos| *pos > 0)
            .unwrap_or(limit.max(next_boundary(remaining)));
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
    out
}

fn next_boundary(s: &str) -> usize {
    s.chars().next().map_or(0, char::len_utf8)
}

fn make_chunk(document_id: &str, index: usize, text: String) -> Chunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
    Chunk {
        id: format!("{document_id}#{index}"),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("products.txt", "The UltraPhone X costs $799.", 256);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "products.txt#0");
        assert_eq!(chunks[0].text, "The UltraPhone X costs $799.");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("empty.txt", "", 256).is_empty());
        assert!(chunk_text("blank.txt", "\n\n   \n\n", 256).is_empty());
    }

    #[test]
    fn test_paragraphs_merge_until_limit() {
        // max_tokens=6 => 24 chars
        let text = "Shipping is $4.99.\n\nExpress is $12.99.\n\nFree over $50.";
        let chunks = chunk_text("shipping.txt", text, 6);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(c.text.len() <= 24, "chunk 过长: {:?}", c.text);
        }
    }

    #[test]
    fn test_long_paragraph_hard_split_keeps_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk_text("greek.txt", text, 4);
        let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.text.split(' ')).collect();
        assert_eq!(rebuilt.join(" "), text);
        assert!(chunks.iter().all(|c| c.text.len() <= 16));
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let text = "耳机支持无线充电，续航二十四小时。".repeat(10);
        let chunks = chunk_text("airbuds.txt", &text, 3);
        assert!(!chunks.is_empty());
        assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text("d", text, 2), chunk_text("d", text, 2));
    }
}
