//! Natural-language-to-SQL query engine.
//!
//! Tool-calling flow: the model gets the live schema and a `run_sql_query`
//! tool, every query it proposes goes through the read-only guard and the
//! executor, the result is fed back, and a follow-up call without tools
//! produces the answer. The direct flow asks for bare SQL and answers with
//! the reduced result.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::answer::reduce;
use crate::config::AnswerMode;
use crate::database::Database;
use crate::error::{AskError, ModelProtocolError};
use crate::llm::{ChatCompletion, ChatMessage, CompletionRequest, ToolCall};
use crate::prompt::{self, RUN_SQL_TOOL};
use crate::sql_guard::{strip_code_fences, validate_sql};

#[derive(Debug, Deserialize)]
struct RunSqlArgs {
    query: String,
}

pub struct QueryEngine<C> {
    db:              Database,
    client:          C,
    max_tool_rounds: u32,
}

impl<C: ChatCompletion> QueryEngine<C> {
    pub fn new(db: Database, client: C) -> Self {
        Self { db, client, max_tool_rounds: 1 }
    }

    /// Number of tool-call round trips before the answer is forced.
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub async fn answer(
        &self,
        mode: AnswerMode,
        question: &str,
        extra_context: Option<&str>,
    ) -> Result<String, AskError> {
        match mode {
            AnswerMode::Tools  => self.ask_with_db(question, extra_context).await,
            AnswerMode::Direct => self.ask_direct(question, extra_context).await,
        }
    }

    /// Answer `question` by letting the model query the database through the tool.
    ///
    /// Guard and execution failures inside a tool call are handed back to the
    /// model as an error payload; only provider and protocol failures end the turn.
    pub async fn ask_with_db(&self, question: &str, extra_context: Option<&str>) -> Result<String, AskError> {
        info!("Question (tools): {}", question);

        let schema = self.db.schema_summary().await?;
        let mut messages = self.opening_messages(
            prompt::build_system_prompt(&schema.to_prompt_text()),
            question,
            extra_context,
        );
        let tools = vec![prompt::run_sql_tool()];

        let mut rounds = 0;
        loop {
            let offer_tools = rounds < self.max_tool_rounds;
            let request = CompletionRequest {
                messages: messages.clone(),
                tools:    if offer_tools { tools.clone() } else { Vec::new() },
            };
            let reply = self.client.complete(request).await?;

            if !offer_tools || reply.tool_calls.is_empty() {
                let answer = reply.text()?;
                info!("Answer ready after {} tool round(s)", rounds);
                return Ok(answer);
            }

            rounds += 1;
            debug!("Tool round {}: {} call(s)", rounds, reply.tool_calls.len());
            messages.push(reply.to_message());
            for call in &reply.tool_calls {
                let payload = self.dispatch_tool_call(call).await?;
                messages.push(ChatMessage::tool_result(call.id.clone(), payload));
            }
        }
    }

    /// Answer `question` with a single model-written query; guard and
    /// execution errors reach the caller.
    pub async fn ask_direct(&self, question: &str, extra_context: Option<&str>) -> Result<String, AskError> {
        info!("Question (direct): {}", question);

        let schema = self.db.schema_summary().await?;
        let messages = self.opening_messages(
            prompt::build_text_to_sql_prompt(&schema.to_prompt_text()),
            question,
            extra_context,
        );

        let reply = self.client.complete(CompletionRequest { messages, tools: Vec::new() }).await?;
        let raw = reply.text()?;
        let query = validate_sql(strip_code_fences(&raw))?;
        info!("Generated SQL: {}", query);

        let result = self.db.execute(&query).await?;
        Ok(reduce(&result))
    }

    fn opening_messages(&self, system_prompt: String, question: &str, extra_context: Option<&str>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        if let Some(ctx) = extra_context.map(str::trim).filter(|c| !c.is_empty()) {
            messages.push(ChatMessage::system(prompt::context_message(ctx)));
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Run one tool call and return the tool-result payload for the model.
    async fn dispatch_tool_call(&self, call: &ToolCall) -> Result<String, ModelProtocolError> {
        if call.function.name != RUN_SQL_TOOL {
            warn!("Model called unknown tool '{}'", call.function.name);
            return Ok(error_payload(format!("unknown tool '{}'", call.function.name)));
        }

        let args: RunSqlArgs = serde_json::from_str(&call.function.arguments).map_err(|e| {
            ModelProtocolError::BadToolArguments { id: call.id.clone(), reason: e.to_string() }
        })?;

        Ok(match self.run_tool_query(&args.query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Tool query rejected: {}", e);
                error_payload(e.to_string())
            }
        })
    }

    async fn run_tool_query(&self, candidate: &str) -> Result<String, AskError> {
        let query = validate_sql(candidate)?;
        info!("Generated SQL: {}", query);
        let result = self.db.execute(&query).await?;
        Ok(reduce(&result))
    }
}

fn error_payload(message: String) -> String {
    json!({ "error": message }).to_string()
}
