//! Terminal chat front-end: turns a user message into a rendered reply.

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::config::AnswerMode;
use crate::error::AskError;
use crate::llm::ChatCompletion;
use crate::query_engine::QueryEngine;
use crate::question::Question;

pub const COMMAND_PREFIX: &str = "/db";
pub const STATUS_THINKING: &str = "🧠 Думаю и обращаюсь к базе данных...";

// ─── Example queries shown to user ──────────────────────────────────────────

pub const EXAMPLE_QUERIES: &[&str] = &[
    "Сколько всего пользователей?",
    "Сколько видео вышло с 1 по 5 марта 2024?",
    "Сколько просмотров набрали все видео за 5 марта 2024?",
    "Покажи топ-5 видео по просмотрам",
    "У какого автора больше всего видео?",
    "На сколько выросли лайки за 28 ноября 2025?",
];

pub struct ChatFrontend<C> {
    engine: QueryEngine<C>,
    mode:   AnswerMode,
}

impl<C: ChatCompletion> ChatFrontend<C> {
    pub fn new(engine: QueryEngine<C>, mode: AnswerMode) -> Self {
        Self { engine, mode }
    }

    /// Handle one incoming message (with or without the `/db` prefix).
    pub async fn handle_message(&self, text: &str) -> String {
        let body = command_body(text);
        if body.is_empty() {
            return format!("⚠️ Добавьте вопрос после команды {}.", COMMAND_PREFIX);
        }

        let question = match Question::parse(body) {
            Ok(q) => q,
            Err(e) => {
                info!("Rejected question: {}", e);
                return format!("⚠️ Некорректный вопрос: {}.", e);
            }
        };

        let extra_context = question.extra_context();
        if let Some(ctx) = &extra_context {
            info!("Date context: {}", ctx);
        }

        match self.engine.answer(self.mode, question.normalized(), extra_context.as_deref()).await {
            Ok(answer) => format!(
                "✅ Ответ от Data-GPT\n\nЗапрос: {}\n\n{}",
                question.normalized(),
                answer
            ),
            Err(e) => render_error(&e),
        }
    }

    /// Interactive loop: ask questions until "exit" or EOF.
    pub async fn repl(&self) -> std::io::Result<()> {
        let mut stdout = io::stdout();
        let mut lines = BufReader::new(io::stdin()).lines();

        stdout.write_all(banner().as_bytes()).await?;
        loop {
            stdout.write_all("❯ ".as_bytes()).await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else { break };
            let input = line.trim();

            if input.is_empty() { continue; }
            if input.eq_ignore_ascii_case("exit")
                || input.eq_ignore_ascii_case("quit")
                || input == "q" { break; }

            stdout.write_all(format!("{}\n", STATUS_THINKING).as_bytes()).await?;
            let reply = self.handle_message(input).await;
            stdout.write_all(format!("{}\n\n", reply).as_bytes()).await?;
        }
        Ok(())
    }
}

/// Message text without the `/db` command word. `/dbfoo` is not the command.
fn command_body(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix(COMMAND_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => trimmed,
    }
}

fn render_error(err: &AskError) -> String {
    match err {
        AskError::Policy(_) | AskError::Execution(_) => {
            warn!("Query rejected: {}", err);
            format!("🚫 Запрос отклонён\n{}", err)
        }
        AskError::Protocol(_) | AskError::Provider(_) => {
            warn!("Question failed: {}", err);
            format!("🚨 Ошибка при запросе\n{}", err)
        }
    }
}

fn banner() -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str("╔════════════════════════════════════════════════════╗\n");
    out.push_str("║   🤖 Data-GPT — вопросы к базе видеоаналитики      ║\n");
    out.push_str("╠════════════════════════════════════════════════════╣\n");
    out.push_str("║  Задайте вопрос по-русски (можно с префиксом /db). ║\n");
    out.push_str("║  Введите 'exit' или Ctrl+D для выхода.             ║\n");
    out.push_str("╠════════════════════════════════════════════════════╣\n");
    out.push_str("  Примеры:\n");
    for q in EXAMPLE_QUERIES {
        out.push_str(&format!("    • {}\n", q));
    }
    out.push_str("╚════════════════════════════════════════════════════╝\n\n");
    out
}
