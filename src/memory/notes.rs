//! 客服备注
//!
//! 纯文本追加日志，每条备注一行：`[YYYY-MM-DD HH:MM:SS] (category): content`。
//! 只追加，不修改、不删除。单进程单写者，没有文件锁。

use crate::error::{Result, ToolError};
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const NO_NOTES: &str = "No notes found.";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub content: String,
}

impl Note {
    /// 以当前本地时间创建；换行被折叠为空格，保证一条备注只占一行
    pub fn now(content: &str, category: Option<&str>) -> Self {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);
        Self {
            timestamp: Local::now().naive_local(),
            category: single_line(category),
            content: single_line(content),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}): {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.category,
            self.content
        )
    }
}

impl FromStr for Note {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let rest = line
            .strip_prefix('[')
            .ok_or_else(|| format!("missing timestamp: {line}"))?;
        let (ts, rest) = rest
            .split_once("] (")
            .ok_or_else(|| format!("missing category: {line}"))?;
        let (category, content) = rest
            .split_once("): ")
            .ok_or_else(|| format!("missing content: {line}"))?;
        let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .map_err(|e| format!("bad timestamp {ts:?}: {e}"))?;
        Ok(Self {
            timestamp,
            category: category.to_string(),
            content: content.to_string(),
        })
    }
}

fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 备注日志文件
#[derive(Debug, Clone)]
pub struct NotesStore {
    path: PathBuf,
}

impl NotesStore {
    /// 打开或创建备注文件，自动建父目录
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        info!(path = %path.display(), "🗒️ 备注文件就绪");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条备注，返回 `Note saved successfully: <content>`
    pub async fn add_note(&self, content: &str, category: Option<&str>) -> Result<String> {
        let note = Note::now(content, category);
        if note.content.is_empty() {
            return Err(ToolError::InvalidParameter {
                name: "content".to_string(),
                message: "note content must not be empty".to_string(),
            }
            .into());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{note}\n").as_bytes()).await?;
        file.flush().await?;

        info!(category = %note.category, "📝 备注已保存");
        Ok(format!("Note saved successfully: {}", note.content))
    }

    /// 最近 `limit` 行原文，按写入顺序
    pub async fn recent_lines(&self, limit: usize) -> Result<Vec<String>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        debug!(total = lines.len(), limit, "读取备注");
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }

    /// 返回最近的备注文本；文件为空时返回 `No notes found.`，读取失败时返回错误描述
    pub async fn get_recent_notes(&self, limit: usize) -> String {
        match self.recent_lines(limit).await {
            Ok(lines) if lines.is_empty() => NO_NOTES.to_string(),
            Ok(lines) => lines.join("\n"),
            Err(e) => format!("Error reading notes: {e}"),
        }
    }

    /// 解析后的最近备注，可按分类过滤；无法解析的行被跳过
    pub async fn recent(&self, limit: usize, category: Option<&str>) -> Result<Vec<Note>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let mut notes: Vec<Note> = raw
            .lines()
            .filter_map(|l| l.parse::<Note>().ok())
            .filter(|n| category.is_none_or(|c| n.category.eq_ignore_ascii_case(c)))
            .collect();
        let start = notes.len().saturating_sub(limit);
        Ok(notes.split_off(start))
    }
}
