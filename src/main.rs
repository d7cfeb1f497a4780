use clap::{Parser, Subcommand};
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::{Value, json};
use shopdesk::agent::{AgentConfig, AgentEvent, DispatchMode, SupportAgent, apology_for};
use shopdesk::config::AppConfig;
use shopdesk::embedding::{Embedder, OpenAiEmbedder};
use shopdesk::error::{Result, SupportError};
use shopdesk::llm::config::ModelConfig;
use shopdesk::llm::{DefaultLlmClient, LlmClient, build_http_client};
use shopdesk::memory::notes::{DEFAULT_RECENT_LIMIT, NO_NOTES};
use shopdesk::memory::{ChatMemory, NotesStore};
use shopdesk::rag::{DocumentLoader, Index, IndexStore, Retriever};
use shopdesk::repl::{self, Command, Input};
use shopdesk::tools::notes::{ADD_NOTE, RECENT_NOTES};
use shopdesk::tools::{AddNoteTool, KnowledgeBaseTool, RecentNotesTool, ToolParameters};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// 小型电商店铺的检索增强客服助手
#[derive(Parser, Debug)]
#[command(name = "shopdesk", version, about)]
struct Cli {
    /// YAML 配置文件
    #[arg(short, long, global = true, env = "SHOPDESK_CONFIG")]
    config: Option<PathBuf>,

    /// 输出 debug 级别日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 源文档目录
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 索引快照目录
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// 客户备注文件
    #[arg(long, global = true)]
    notes_file: Option<PathBuf>,

    /// Chat 模型名
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 交互式客服会话（默认）
    Chat {
        /// 逐 token 输出回答
        #[arg(long)]
        stream: bool,
        /// 跳过规划器，每个问题直接查询知识库
        #[arg(long)]
        direct: bool,
    },
    /// 构建或加载索引快照并打印统计信息
    Index {
        /// 忽略已有快照，强制重建
        #[arg(long)]
        rebuild: bool,
    },
    /// 查看最近的客户备注
    Notes {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        #[arg(short = 'C', long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_startup_fatal() {
                error!(error = %e, "❌ 启动失败");
            }
            eprintln!("shopdesk: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("shopdesk=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shopdesk=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.index_dir {
        config.index_dir = dir;
    }
    if let Some(path) = cli.notes_file {
        config.notes_file = path;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command.unwrap_or(Commands::Chat {
        stream: false,
        direct: false,
    }) {
        Commands::Chat { stream, direct } => run_chat(config, stream, direct).await,
        Commands::Index { rebuild } => run_index(config, rebuild).await,
        Commands::Notes { limit, category } => run_notes(config, limit, category).await,
    }
}

fn build_embedder(config: &AppConfig, client: Arc<reqwest::Client>) -> Result<Arc<dyn Embedder>> {
    let embedder = OpenAiEmbedder::new(
        client,
        ModelConfig::embedding_from(config)?,
        config.request.clone(),
    )
    .batch_size(config.embed_batch_size);
    Ok(Arc::new(embedder))
}

async fn open_index(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
    rebuild: bool,
) -> Result<(IndexStore, Index)> {
    let loader = DocumentLoader::new(config.data_dir.clone()).recursive(config.recursive);
    let store = IndexStore::new(config.index_dir.clone(), embedder)
        .chunk_tokens(config.chunk_tokens)
        .staleness(config.staleness);
    let index = if rebuild {
        store.rebuild(&loader).await?
    } else {
        store.get_index(&loader).await?
    };
    Ok((store, index))
}

async fn run_index(config: AppConfig, rebuild: bool) -> Result<()> {
    config.validate()?;
    let client = build_http_client(&config.request)?;
    let embedder = build_embedder(&config, client)?;
    let (store, index) = open_index(&config, embedder, rebuild).await?;

    println!("Index snapshot: {}", store.dir().display());
    println!("  documents:  {}", index.documents());
    println!("  chunks:     {}", index.len());
    println!("  dimensions: {}", index.dims());
    println!("  model:      {}", index.embedding_model());
    println!("  source:     {}", index.source_hash());
    println!("  built at:   {}", index.built_at().format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

async fn run_notes(config: AppConfig, limit: usize, category: Option<String>) -> Result<()> {
    let store = NotesStore::new(&config.notes_file)?;
    let notes = store.recent(limit.max(1), category.as_deref()).await?;
    if notes.is_empty() {
        println!("{NO_NOTES}");
    }
    for note in notes {
        println!("{note}");
    }
    Ok(())
}

async fn run_chat(config: AppConfig, stream: bool, direct: bool) -> Result<()> {
    config.validate()?;

    // 所有依赖在进入交互循环前构造完毕，任何一步失败都直接退出
    let client = build_http_client(&config.request)?;
    let embedder = build_embedder(&config, client.clone())?;
    let (_, index) = open_index(&config, embedder.clone(), false).await?;
    info!(chunks = index.len(), "📚 索引就绪");

    let retriever = Arc::new(Retriever::new(Arc::new(index), embedder).top_k(config.top_k));
    let llm: Arc<dyn LlmClient> = Arc::new(
        DefaultLlmClient::new(client, ModelConfig::chat_from(&config)?, config.request.clone())
            .temperature(config.temperature),
    );
    let memory = ChatMemory::shared(config.token_limit);
    let notes = Arc::new(NotesStore::new(&config.notes_file)?);

    let knowledge = KnowledgeBaseTool::new(retriever, llm.clone(), memory.clone())
        .top_k(config.top_k)
        .similarity_floor(config.similarity_floor);
    let dispatch = if direct {
        DispatchMode::Direct
    } else {
        DispatchMode::Planner
    };
    let mut agent = SupportAgent::new(AgentConfig::from_app(&config).dispatch(dispatch), llm, memory)
        .with_tools(vec![
            Box::new(knowledge),
            Box::new(AddNoteTool::new(notes.clone())),
            Box::new(RecentNotesTool::new(notes)),
        ]);

    let session = uuid::Uuid::new_v4();
    info!(
        session = %session,
        model = agent.model_name(),
        tools = ?agent.list_tools(),
        ?dispatch,
        "🚀 客服会话开始"
    );
    repl_loop(&mut agent, stream)
        .instrument(info_span!("session", id = %session))
        .await
}

async fn repl_loop(agent: &mut SupportAgent, stream: bool) -> Result<()> {
    let mut rl = DefaultEditor::new()
        .map_err(|e| SupportError::Other(format!("failed to initialize readline: {e}")))?;

    println!("{}", repl::banner());

    loop {
        agent.await_input();
        println!();
        let line = match rl.readline(repl::PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "读取输入失败");
                break;
            }
        };

        match repl::parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Command(command) => {
                let _ = rl.add_history_entry(line.as_str());
                run_command(agent, command).await;
            }
            Input::Query(query) => {
                let _ = rl.add_history_entry(line.as_str());
                if stream {
                    stream_answer(agent, &query).await;
                } else {
                    let answer = agent.respond(&query).await;
                    println!("\nAssistant: {answer}");
                }
            }
        }
    }

    agent.shutdown();
    println!("\n{}", repl::FAREWELL);
    Ok(())
}

/// 操作员命令走确定性分发，不经过规划器
async fn run_command(agent: &mut SupportAgent, command: Command) {
    let outcome = match command {
        Command::AddNote { content, category } => {
            let mut params = ToolParameters::from([("content".to_string(), Value::String(content))]);
            if let Some(category) = category {
                params.insert("category".to_string(), Value::String(category));
            }
            agent.dispatch(ADD_NOTE, params).await
        }
        Command::RecentNotes { limit } => {
            let params = ToolParameters::from([("limit".to_string(), json!(limit))]);
            agent.dispatch(RECENT_NOTES, params).await
        }
        Command::Reset => {
            agent.reset().await;
            Ok("Conversation history cleared.".to_string())
        }
        Command::Help => Ok(repl::HELP.to_string()),
        Command::Invalid(message) => Ok(message),
    };

    match outcome {
        Ok(text) => println!("\n{text}"),
        Err(e) => {
            warn!(error = %e, "命令执行失败");
            println!("\n{}", apology_for(&e));
        }
    }
}

async fn stream_answer(agent: &mut SupportAgent, query: &str) {
    print!("\nAssistant: ");
    let _ = std::io::stdout().flush();

    // 自上一次工具结果以来是否已经输出过文本
    let mut printed = false;
    let mut failure = None;
    {
        let mut events = agent.chat_stream(query);
        while let Some(event) = events.next().await {
            match event {
                Ok(AgentEvent::Token(text)) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                    printed = true;
                }
                Ok(AgentEvent::ToolCall { name, args }) => {
                    debug!(tool = %name, args = %args, "🔧 调用工具");
                }
                Ok(AgentEvent::ToolResult { name, .. }) => {
                    debug!(tool = %name, "📋 工具返回");
                    printed = false;
                }
                Ok(AgentEvent::FinalAnswer(answer)) => {
                    if !printed {
                        print!("{answer}");
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
    }

    if let Some(e) = failure {
        warn!(error = %e, "本轮处理失败");
        if printed {
            println!();
        }
        print!("{}", apology_for(&e));
    }
    println!();
}
