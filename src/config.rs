//! 应用配置
//!
//! 三层叠加，后者覆盖前者：
//!
//! 1. YAML 配置文件（可选，`--config <path>`）
//! 2. 进程环境变量（启动时先执行 `dotenv` 加载 `.env`）
//! 3. 命令行参数（见 `main.rs`）
//!
//! 环境变量统一使用 `SHOPDESK_` 前缀：
//! ```text
//! SHOPDESK_API_KEY=sk-...            # 缺省时回退到 OPENAI_API_KEY
//! SHOPDESK_MODEL=gpt-4o-mini-2024-07-18
//! SHOPDESK_BASE_URL=https://api.openai.com/v1
//! SHOPDESK_EMBED_MODEL=text-embedding-3-small
//! SHOPDESK_DATA_DIR=assessment_data
//! SHOPDESK_INDEX_DIR=text_data
//! SHOPDESK_NOTES_FILE=customer_notes.txt
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SHOPDESK_";

/// 快照与源文档内容不一致时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// 不读取源文档，直接信任快照
    Ignore,
    /// 读取源文档计算哈希，不一致时记录告警但仍使用快照
    #[default]
    Warn,
    /// 不一致时重新构建索引
    Rebuild,
}

impl std::str::FromStr for StalenessPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(ConfigError::InvalidValue {
                field: "staleness".to_string(),
                message: format!("expected ignore|warn|rebuild, got '{other}'"),
            }),
        }
    }
}

/// 外部模型服务的调用策略：超时与重试
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestPolicy {
    /// 单次 HTTP 请求超时（秒）
    pub timeout_secs: u64,
    /// 可重试错误的最大重试次数（0 = 不重试）
    pub max_retries: usize,
    /// 首次重试前等待（毫秒），之后每次翻倍
    pub retry_delay_ms: u64,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl RequestPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 第 `attempt` 次重试（从 1 开始）前的退避时长
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1) as u32).min(5);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(1u64 << shift))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    /// Chat 模型名
    pub model: String,
    /// Chat Completions 接口的 base URL（不含 `/chat/completions`）
    pub base_url: String,
    pub embed_model: String,
    /// 为空时复用 `base_url`
    pub embed_base_url: Option<String>,
    pub embed_batch_size: usize,
    pub data_dir: PathBuf,
    /// 是否递归读取子目录
    pub recursive: bool,
    pub index_dir: PathBuf,
    pub notes_file: PathBuf,
    pub top_k: usize,
    /// 对话记忆的 token 预算
    pub token_limit: usize,
    /// 单个 chunk 的 token 上限
    pub chunk_tokens: usize,
    /// 相似度下限，所有检索结果都低于它时直接返回兜底回复（None = 不设下限）
    pub similarity_floor: Option<f32>,
    pub temperature: f32,
    pub max_iterations: usize,
    pub staleness: StalenessPolicy,
    pub request: RequestPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini-2024-07-18".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            embed_base_url: None,
            embed_batch_size: 64,
            data_dir: PathBuf::from("assessment_data"),
            recursive: false,
            index_dir: PathBuf::from("text_data"),
            notes_file: PathBuf::from("customer_notes.txt"),
            top_k: 3,
            token_limit: 2500,
            chunk_tokens: 256,
            similarity_floor: None,
            temperature: 0.2,
            max_iterations: 10,
            staleness: StalenessPolicy::default(),
            request: RequestPolicy::default(),
        }
    }
}

impl AppConfig {
    /// 读取 YAML 配置文件（缺省字段取默认值）
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config: AppConfig = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    /// 按顺序加载配置文件（可选）与环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 用给定的查找函数覆盖配置，测试中无需修改进程环境
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get("API_KEY").or_else(|| {
            lookup("OPENAI_API_KEY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }) {
            self.api_key = Some(key);
        }
        if let Some(v) = get("MODEL") {
            self.model = v;
        }
        if let Some(v) = get("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("EMBED_MODEL") {
            self.embed_model = v;
        }
        if let Some(v) = get("EMBED_BASE_URL") {
            self.embed_base_url = Some(v);
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("INDEX_DIR") {
            self.index_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NOTES_FILE") {
            self.notes_file = PathBuf::from(v);
        }
        if let Some(v) = get("TOP_K") {
            self.top_k = parse_field("top_k", &v)?;
        }
        if let Some(v) = get("TOKEN_LIMIT") {
            self.token_limit = parse_field("token_limit", &v)?;
        }
        if let Some(v) = get("SIMILARITY_FLOOR") {
            self.similarity_floor = Some(parse_field("similarity_floor", &v)?);
        }
        if let Some(v) = get("TIMEOUT_SECS") {
            self.request.timeout_secs = parse_field("timeout_secs", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.request.max_retries = parse_field("max_retries", &v)?;
        }
        if let Some(v) = get("STALENESS") {
            self.staleness = v.parse()?;
        }
        Ok(())
    }

    /// 启动前校验，缺少凭据时立即失败
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(ConfigError::MissingField(
                "api_key (set SHOPDESK_API_KEY or OPENAI_API_KEY)".to_string(),
            )
            .into());
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField("model".to_string()).into());
        }
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be at least 1"));
        }
        if self.token_limit == 0 {
            return Err(invalid("token_limit", "must be at least 1"));
        }
        if self.chunk_tokens == 0 {
            return Err(invalid("chunk_tokens", "must be at least 1"));
        }
        if self.embed_batch_size == 0 {
            return Err(invalid("embed_batch_size", "must be at least 1"));
        }
        if self.request.timeout_secs == 0 {
            return Err(invalid("request.timeout_secs", "must be at least 1"));
        }
        if let Some(floor) = self.similarity_floor
            && !(-1.0..=1.0).contains(&floor)
        {
            return Err(invalid("similarity_floor", "must be within [-1, 1]"));
        }
        Ok(())
    }

    /// 校验通过后取出 API key
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("api_key".to_string()).into())
    }

    pub fn embed_base_url(&self) -> &str {
        self.embed_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(field, &e.to_string()))
}

fn invalid(field: &str, message: &str) -> crate::error::SupportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupportError;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_follow_store_setup() {
        let config = AppConfig::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.token_limit, 2500);
        assert_eq!(config.index_dir, PathBuf::from("text_data"));
        assert_eq!(config.notes_file, PathBuf::from("customer_notes.txt"));
        assert!(config.similarity_floor.is_none());
    }

    #[test]
    fn test_missing_api_key_fails_fast() {
        let config = AppConfig::default();
        match config.validate() {
            Err(SupportError::Config(ConfigError::MissingField(field))) => {
                assert!(field.starts_with("api_key"))
            }
            other => panic!("应该返回缺少 api_key 的配置错误: {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let mut config = AppConfig::default();
        config.apply_env_with(lookup(&[
            ("SHOPDESK_API_KEY", "sk-test"),
            ("SHOPDESK_TOP_K", "5"),
            ("SHOPDESK_SIMILARITY_FLOOR", "0.25"),
            ("SHOPDESK_STALENESS", "rebuild"),
            ("SHOPDESK_INDEX_DIR", "/tmp/idx"),
        ]))?;
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.similarity_floor, Some(0.25));
        assert_eq!(config.staleness, StalenessPolicy::Rebuild);
        assert_eq!(config.index_dir, PathBuf::from("/tmp/idx"));
        config.validate()
    }

    #[test]
    fn test_openai_key_fallback() -> Result<()> {
        let mut config = AppConfig::default();
        config.apply_env_with(lookup(&[("OPENAI_API_KEY", "sk-openai")]))?;
        assert_eq!(config.api_key()?, "sk-openai");
        Ok(())
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_with(lookup(&[("SHOPDESK_TOP_K", "three")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SupportError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_floor_out_of_range_rejected() {
        let config = AppConfig {
            api_key: Some("sk".into()),
            similarity_floor: Some(1.5),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AppConfig {
            api_key: Some("sk".into()),
            request: RequestPolicy {
                timeout_secs: 0,
                ..RequestPolicy::default()
            },
            ..AppConfig::default()
        };
        match config.validate() {
            Err(SupportError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "request.timeout_secs")
            }
            other => panic!("超时为 0 应被拒绝: {:?}", other),
        }
    }

    #[test]
    fn test_yaml_file_partial_fields() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shopdesk.yaml");
        std::fs::write(
            &path,
            "model: gpt-4o\ntop_k: 4\nrequest:\n  timeout_secs: 10\n",
        )?;
        let config = AppConfig::from_file(&path)?;
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.top_k, 4);
        assert_eq!(config.request.timeout_secs, 10);
        assert_eq!(config.request.max_retries, 3);
        assert_eq!(config.token_limit, 2500);
        Ok(())
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RequestPolicy {
            timeout_secs: 1,
            max_retries: 3,
            retry_delay_ms: 100,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }
}
