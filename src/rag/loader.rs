//! 文档加载：把目录中的文本文件读成 [`Document`] 列表
//!
//! 返回顺序按相对路径字典序排列，保证相同输入得到相同的索引。

use crate::error::{LoadError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 一份已加载的源文档，加载后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// 相对于数据目录的路径（统一使用 `/` 分隔），作为文档标识
    pub id: String,
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    dir: PathBuf,
    recursive: bool,
}

impl DocumentLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 读取目录下所有可读的 UTF-8 文本文件
    ///
    /// 隐藏文件（以 `.` 开头）与非 UTF-8 文件会被跳过。
    /// 目录不存在或没有任何可读文档时返回 [`LoadError`]。
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.dir.is_dir() {
            return Err(LoadError::DirectoryNotFound(self.dir.display().to_string()).into());
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut documents = Vec::new();

        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(self.dir.as_path()).display().to_string();
                    warn!(path = %path, error = %e, "跳过无法访问的目录项");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let id = relative_id(&self.dir, path);
                    debug!(document = %id, bytes = content.len(), "📄 读取文档");
                    documents.push(Document {
                        id,
                        path: path.to_path_buf(),
                        content,
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "跳过不可读的文件");
                }
            }
        }

        if documents.is_empty() {
            return Err(LoadError::NoDocuments(self.dir.display().to_string()).into());
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        info!(dir = %self.dir.display(), documents = documents.len(), "📚 文档加载完成");
        Ok(documents)
    }
}

/// 整个语料的 SHA-256 指纹，快照用它判断源文档是否已变化
pub fn corpus_hash(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
