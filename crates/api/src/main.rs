//! DevBot binary.
//!
//! Usage:
//!   devbot serve --port 8000
//!   devbot --config devbot.toml chat --user ana --document notes.md
//!   devbot ingest src/utils.py
//!   devbot index-tutorial tutorials/python_tutorial.md
//!
//! # Environment Variables
//!
//! - `DEVBOT_CONFIG` - Path to the TOML config file
//! - `DEVBOT_API_KEY` - API bearer key (recommended when not bound to localhost)
//! - `DEVBOT_BIND_ADDR` / `DEVBOT_PORT` - Server address overrides
//! - `DEVBOT_LLM_API_KEY` - Key for OpenAI-compatible model servers
//! - `DATABASE_URL` - Postgres URL for the postgres backends

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use devbot_api::{serve, AppState, API_KEY_ENV};
use devbot_chat::{Backend, ChatService, DevbotConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "devbot", about = "Retrieval-augmented coding assistant", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, env = "DEVBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(short, long, env = "DEVBOT_BIND_ADDR")]
        bind: Option<String>,

        /// Port (overrides server.port)
        #[arg(short, long, env = "DEVBOT_PORT")]
        port: Option<u16>,
    },

    /// Interactive chat in the terminal
    Chat {
        /// User the history is recorded under
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Documents to ingest and use as context for this session
        #[arg(short, long)]
        document: Vec<PathBuf>,
    },

    /// Ingest a text document into a new collection
    Ingest { path: PathBuf },

    /// Rebuild the tutorial collection from a markdown file
    IndexTutorial {
        /// Markdown file (defaults to ingest.tutorial_path)
        path: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,devbot_api=debug,tower_http=debug"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DevbotConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            DevbotConfig::from_file(path)
        }
        None => {
            info!("Using default configuration");
            Ok(DevbotConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await
        }
        Command::Chat { user, document } => run_repl(config, &user, &document).await,
        Command::Ingest { path } => {
            if config.store.backend == Backend::Memory {
                warn!("Store backend is 'memory'; the ingested document is lost when this process exits");
            }
            let service = ChatService::from_config(&config).await?;
            let report = service.retrieval().ingestor().ingest_file(&path).await?;
            println!("{} ({} chunks)", report.collection, report.chunks);
            Ok(())
        }
        Command::IndexTutorial { path } => {
            let path = path.unwrap_or_else(|| config.ingest.tutorial_path.clone());
            if config.store.backend == Backend::Memory {
                warn!("Store backend is 'memory'; the tutorial index is lost when this process exits");
            }
            let service = ChatService::from_config(&config).await?;
            let report = service.retrieval().ingestor().index_tutorial(&path).await?;
            println!("{} ({} chunks)", report.collection, report.chunks);
            Ok(())
        }
    }
}

async fn run_server(config: DevbotConfig) -> anyhow::Result<()> {
    if config.server.bind == "0.0.0.0" {
        warn!("Server binding to 0.0.0.0 exposes the API to all network interfaces");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.bind, config.server.port))?;

    let chat = ChatService::from_config(&config).await?;
    let mut state = AppState::new(chat).with_cors_origins(config.server.cors_origins.clone());

    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() => {
            state = state.with_api_key(key);
            info!("API key authentication enabled");
        }
        _ => warn!("{API_KEY_ENV} not set; the API runs without authentication"),
    }

    serve(Arc::new(state), addr).await
}

async fn run_repl(config: DevbotConfig, user: &str, documents: &[PathBuf]) -> anyhow::Result<()> {
    let service = ChatService::from_config(&config).await?;
    let user = user.trim().to_lowercase();

    let mut active = Vec::new();
    for path in documents {
        let report = service.retrieval().ingestor().ingest_file(path).await?;
        println!("Loaded {} ({} chunks)", path.display(), report.chunks);
        if !active.contains(&report.collection) {
            active.push(report.collection);
        }
    }

    println!("DevBot ({}). Type 'exit' or 'quit' to leave.", service.model_name());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            break;
        }

        let turn = service.chat(&user, &line, &active).await;
        println!("{}\n", turn.answer);
    }

    Ok(())
}
