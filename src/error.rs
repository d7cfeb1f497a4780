use std::fmt;

/// shopdesk 的统一错误类型
#[derive(Debug)]
pub enum SupportError {
    /// 文档目录加载错误
    Load(LoadError),
    /// 索引快照 / 检索错误
    Index(IndexError),
    /// LLM 与 Embedding 服务错误
    Llm(LlmError),
    /// 工具执行错误
    Tool(ToolError),
    /// 解析错误
    Parse(ParseError),
    /// Agent 执行错误
    Agent(AgentError),
    /// 配置错误
    Config(ConfigError),
    /// IO 错误
    Io(std::io::Error),
    /// 其他错误
    Other(String),
}

/// 文档加载错误
#[derive(Debug)]
pub enum LoadError {
    /// 目录不存在
    DirectoryNotFound(String),
    /// 目录中没有可读的文本文件
    NoDocuments(String),
}

/// 索引错误
#[derive(Debug)]
pub enum IndexError {
    /// 快照不可读或结构无效
    Corrupt { path: String, message: String },
    /// 索引中没有任何 chunk
    Empty,
    /// 查询向量与索引向量维度不一致
    DimensionMismatch { expected: usize, actual: usize },
    /// 快照由另一个 embedding 模型构建
    ModelMismatch { index: String, embedder: String },
}

/// 外部模型服务错误（chat / embedding）
#[derive(Debug)]
pub enum LlmError {
    /// 网络请求失败
    NetworkError(String),
    /// 请求超时
    Timeout(String),
    /// API 返回错误状态码
    ApiError { status: u16, message: String },
    /// 响应格式无效
    InvalidResponse(String),
    /// 没有返回内容
    EmptyResponse,
}

/// 工具执行错误
#[derive(Debug)]
pub enum ToolError {
    /// 工具未找到
    NotFound(String),
    /// 参数缺失
    MissingParameter(String),
    /// 参数类型错误
    InvalidParameter { name: String, message: String },
    /// 工具执行失败
    ExecutionFailed { tool: String, message: String },
    /// 工具执行超时
    Timeout(String),
}

/// 解析错误
#[derive(Debug)]
pub enum ParseError {
    /// JSON 解析错误
    JsonError(String),
    /// 工具调用参数无法解析
    InvalidArguments { tool: String, message: String },
}

/// Agent 执行错误
#[derive(Debug)]
pub enum AgentError {
    /// 超过最大迭代次数
    MaxIterationsExceeded(usize),
    /// 没有响应
    NoResponse,
    /// 已进入 Shutdown 状态
    ShutDown,
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 缺少必需的配置项
    MissingField(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

impl SupportError {
    /// 启动阶段的致命错误：进程应以非零状态退出，而不是进入交互循环
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            SupportError::Load(_)
                | SupportError::Config(_)
                | SupportError::Index(IndexError::Corrupt { .. })
                | SupportError::Index(IndexError::ModelMismatch { .. })
        )
    }

    /// 外部服务的错误（网络、超时、服务端异常），可以提示用户稍后重试
    pub fn is_collaborator(&self) -> bool {
        matches!(self, SupportError::Llm(_))
    }

    /// 值得自动重试的错误：网络、超时、429 和 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            SupportError::Llm(LlmError::NetworkError(_)) | SupportError::Llm(LlmError::Timeout(_)) => {
                true
            }
            SupportError::Llm(LlmError::ApiError { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

// 实现 Display trait
impl fmt::Display for SupportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportError::Load(e) => write!(f, "Load Error: {}", e),
            SupportError::Index(e) => write!(f, "Index Error: {}", e),
            SupportError::Llm(e) => write!(f, "Collaborator Error: {}", e),
            SupportError::Tool(e) => write!(f, "Tool Error: {}", e),
            SupportError::Parse(e) => write!(f, "Parse Error: {}", e),
            SupportError::Agent(e) => write!(f, "Agent Error: {}", e),
            SupportError::Config(e) => write!(f, "Config Error: {}", e),
            SupportError::Io(e) => write!(f, "IO Error: {}", e),
            SupportError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::DirectoryNotFound(path) => {
                write!(f, "Document directory not found: {}", path)
            }
            LoadError::NoDocuments(path) => {
                write!(f, "No readable documents in directory: {}", path)
            }
        }
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::Corrupt { path, message } => {
                write!(f, "Corrupt index snapshot at '{}': {}", path, message)
            }
            IndexError::Empty => write!(f, "Index contains no chunks"),
            IndexError::DimensionMismatch { expected, actual } => write!(
                f,
                "Embedding dimension mismatch: index has {}, query has {}",
                expected, actual
            ),
            IndexError::ModelMismatch { index, embedder } => write!(
                f,
                "Index was built with embedding model '{}' but the embedder is '{}'",
                index, embedder
            ),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LlmError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            LlmError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            LlmError::EmptyResponse => write!(f, "Empty response from model service"),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool '{}' not found", name),
            ToolError::MissingParameter(name) => write!(f, "Missing parameter: {}", name),
            ToolError::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter '{}': {}", name, message)
            }
            ToolError::ExecutionFailed { tool, message } => {
                write!(f, "Tool '{}' execution failed: {}", tool, message)
            }
            ToolError::Timeout(name) => write!(f, "Tool '{}' timed out", name),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::JsonError(msg) => write!(f, "JSON parse error: {}", msg),
            ParseError::InvalidArguments { tool, message } => {
                write!(f, "Invalid arguments for tool '{}': {}", tool, message)
            }
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::MaxIterationsExceeded(n) => {
                write!(f, "Max iterations exceeded: {}", n)
            }
            AgentError::NoResponse => write!(f, "No response from LLM"),
            AgentError::ShutDown => write!(f, "Agent has been shut down"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing config field: {}", field),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

// 实现 std::error::Error trait
impl std::error::Error for SupportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SupportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for LoadError {}
impl std::error::Error for IndexError {}
impl std::error::Error for LlmError {}
impl std::error::Error for ToolError {}
impl std::error::Error for ParseError {}
impl std::error::Error for AgentError {}
impl std::error::Error for ConfigError {}

// From 转换实现
impl From<std::io::Error> for SupportError {
    fn from(err: std::io::Error) -> Self {
        SupportError::Io(err)
    }
}

impl From<reqwest::Error> for SupportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SupportError::Llm(LlmError::Timeout(err.to_string()))
        } else if err.is_connect() {
            SupportError::Llm(LlmError::NetworkError(format!(
                "Connection failed: {}",
                err
            )))
        } else if err.is_decode() {
            SupportError::Llm(LlmError::InvalidResponse(err.to_string()))
        } else {
            SupportError::Llm(LlmError::NetworkError(err.to_string()))
        }
    }
}

impl From<serde_json::Error> for SupportError {
    fn from(err: serde_json::Error) -> Self {
        SupportError::Parse(ParseError::JsonError(err.to_string()))
    }
}

impl From<serde_yaml::Error> for SupportError {
    fn from(err: serde_yaml::Error) -> Self {
        SupportError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<LoadError> for SupportError {
    fn from(err: LoadError) -> Self {
        SupportError::Load(err)
    }
}

impl From<IndexError> for SupportError {
    fn from(err: IndexError) -> Self {
        SupportError::Index(err)
    }
}

impl From<LlmError> for SupportError {
    fn from(err: LlmError) -> Self {
        SupportError::Llm(err)
    }
}

impl From<ToolError> for SupportError {
    fn from(err: ToolError) -> Self {
        SupportError::Tool(err)
    }
}

impl From<ParseError> for SupportError {
    fn from(err: ParseError) -> Self {
        SupportError::Parse(err)
    }
}

impl From<AgentError> for SupportError {
    fn from(err: AgentError) -> Self {
        SupportError::Agent(err)
    }
}

impl From<ConfigError> for SupportError {
    fn from(err: ConfigError) -> Self {
        SupportError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, SupportError>;
