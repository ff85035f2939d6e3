use anyhow::Result;
use clap::{Parser, Subcommand};

use data_gpt::chat::ChatFrontend;
use data_gpt::config::{self, AnswerMode};
use data_gpt::database::{resolve_db_path, Database};
use data_gpt::llm::LlmClient;
use data_gpt::logging::init_logging;
use data_gpt::query_engine::QueryEngine;
use data_gpt::{extract_date_range, validate_sql};

#[derive(Parser)]
#[command(name = "data-gpt", version)]
#[command(about = "Ask questions about video analytics data via LLM-written, read-only SQL")]
struct Cli {
    /// SQLite database file (overrides DATAGPT__DATABASE__PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question (non-interactive)
    Ask {
        question: String,
        /// Answer with one model-written query instead of tool calls
        #[arg(long)] direct: bool,
    },

    /// Interactive chat
    Repl {
        #[arg(long)] direct: bool,
    },

    /// Print the schema summary the model sees
    Schema,

    /// Check a query against the read-only policy
    Validate {
        sql: String,
    },

    /// Show the date range extracted from a question
    Dates {
        text: String,
    },

    /// Create the dataset tables in the database file
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config().unwrap_or_else(|e| {
        eprintln!("Config load failed ({}), using defaults", e);
        config::AppConfig::default()
    });
    if let Some(db) = cli.db {
        cfg.database.path = db;
    }
    init_logging(&cfg.logging);

    match cli.command {
        Command::Ask { question, direct } => {
            let chat = build_frontend(&cfg, direct)?;
            println!("{}", chat.handle_message(&question).await);
        }

        Command::Repl { direct } => {
            let chat = build_frontend(&cfg, direct)?;
            chat.repl().await?;
        }

        Command::Schema => {
            let db = Database::open(&cfg.database)?;
            let summary = db.schema_summary().await?;
            println!("{}", summary.to_prompt_text());
        }

        Command::Validate { sql } => match validate_sql(&sql) {
            Ok(query) => println!("OK: {}", query),
            Err(e) => {
                println!("REJECTED: {}", e);
                std::process::exit(1);
            }
        },

        Command::Dates { text } => match extract_date_range(&text) {
            Ok(Some(range)) => println!("{}", range.to_context()),
            Ok(None) => println!("no date mentioned"),
            Err(e) => println!("invalid date: {}", e),
        },

        Command::InitDb => {
            let path = resolve_db_path(&cfg.database.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::create_schema(&path)?;
            println!("Schema ready → {}", path.display());
        }
    }
    Ok(())
}

fn build_frontend(cfg: &config::AppConfig, direct: bool) -> Result<ChatFrontend<LlmClient>> {
    let db = Database::open(&cfg.database)?;
    let client = LlmClient::from_config(&cfg.llm)?;
    let engine = QueryEngine::new(db, client).with_max_tool_rounds(cfg.llm.max_tool_rounds);
    let mode = if direct { AnswerMode::Direct } else { cfg.llm.mode };
    Ok(ChatFrontend::new(engine, mode))
}
