//! 模型连接配置
//!
//! 由 [`AppConfig`] 在启动时一次性构造，之后以值的形式注入客户端，
//! 不再使用进程级全局状态。

use crate::config::AppConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// 单个模型的连接配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    /// LLM 接口中使用的模型名（如 `gpt-4o-mini`）
    pub model: String,
    /// 接口 base URL（如 `https://api.openai.com/v1`）
    pub baseurl: String,
    pub apikey: String,
}

impl ModelConfig {
    pub fn new(
        model: impl Into<String>,
        baseurl: impl Into<String>,
        apikey: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            baseurl: baseurl.into(),
            apikey: apikey.into(),
        }
    }

    /// Chat 模型配置
    pub fn chat_from(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(&config.model, &config.base_url, config.api_key()?))
    }

    /// Embedding 模型配置
    pub fn embedding_from(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            &config.embed_model,
            config.embed_base_url(),
            config.api_key()?,
        ))
    }

    /// 拼出 `/chat/completions` 完整地址；已是完整地址时原样返回
    pub fn chat_url(&self) -> String {
        endpoint(&self.baseurl, "chat/completions")
    }

    /// 拼出 `/embeddings` 完整地址
    pub fn embeddings_url(&self) -> String {
        endpoint(&self.baseurl, "embeddings")
    }
}

fn endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(path) {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let cfg = ModelConfig::new("m", "https://api.openai.com/v1/", "k");
        assert_eq!(cfg.chat_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(cfg.embeddings_url(), "https://api.openai.com/v1/embeddings");

        let full = ModelConfig::new("m", "http://localhost:8080/v1/chat/completions", "k");
        assert_eq!(full.chat_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_chat_from_requires_key() {
        let config = AppConfig::default();
        assert!(ModelConfig::chat_from(&config).is_err());
    }
}
