use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm:      LlmConfig,
    pub logging:  LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; bare names resolve under the local data directory
    pub path:            String,
    /// Upper bound on simultaneously open read-only connections
    pub max_connections: usize,
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "data-gpt.db".into(), max_connections: 4, busy_timeout_ms: 5000 }
    }
}

/// How a question is turned into an answer.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Model calls `run_sql_query`, sees the rows, then answers in prose
    #[default]
    Tools,
    /// Model writes one SQL statement; the reduced result is the answer
    Direct,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    // ── OpenRouter (primary) ─────────────────────────────────────────────
    /// OpenRouter API key (prefer env OPENROUTER_API_KEY)
    pub openrouter_api_key:  Option<String>,
    pub openrouter_base_url: String,
    pub openrouter_model:    String,

    // ── Local fallback (Ollama / llama.cpp / LM Studio) ──────────────────
    /// Local server base URL (e.g. "http://localhost:11434/v1")
    pub local_base_url: Option<String>,
    pub local_model:    String,

    pub max_tokens:   u32,
    pub temperature:  f32,
    /// Ask OpenRouter for a reasoning pass before the answer
    pub reasoning:    bool,
    pub timeout_secs: u64,
    /// Tool-call round trips allowed before the answer is forced
    pub max_tool_rounds: u32,
    pub mode:         AnswerMode,
}
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key:  None,
            openrouter_base_url: "https://openrouter.ai/api/v1".into(),
            openrouter_model:    "deepseek/deepseek-v3.2".into(),
            local_base_url:      None,
            local_model:         "qwen2.5:7b".into(),
            max_tokens:          1024,
            temperature:         0.0,
            reasoning:           false,
            timeout_secs:        60,
            max_tool_rounds:     1,
            mode:                AnswerMode::Tools,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is not set
    pub level: String,
    /// Also write a daily-rotated log file
    pub file:  bool,
    pub dir:   Option<PathBuf>,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), file: true, dir: None }
    }
}

pub fn load_config() -> Result<AppConfig> {
    // .env next to the binary's working dir, then data-gpt.{toml,yaml,json}, then DATAGPT__* env
    dotenvy::dotenv().ok();

    let cfg = config::Config::builder()
        .add_source(config::File::with_name("data-gpt").required(false))
        .add_source(config::Environment::with_prefix("DATAGPT").separator("__"))
        .build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;

    // Convenience: OPENROUTER_API_KEY env var (without DATAGPT__ prefix)
    if app.llm.openrouter_api_key.is_none() {
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            app.llm.openrouter_api_key = Some(key);
        }
    }

    Ok(app)
}
