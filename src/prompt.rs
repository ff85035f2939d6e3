//! Prompts and tool declarations for the SQL assistant.

use serde_json::json;

use crate::llm::ToolDefinition;
use crate::sql_guard::DEFAULT_ROW_LIMIT;

pub const RUN_SQL_TOOL: &str = "run_sql_query";

/// Worked example embedded in both prompts.
pub const EXAMPLE_QUESTION: &str = "Сколько всего пользователей?";
pub const EXAMPLE_SQL: &str = "SELECT COUNT(*) FROM users";

/// The single tool the model may call.
pub fn run_sql_tool() -> ToolDefinition {
    ToolDefinition {
        name: RUN_SQL_TOOL.to_string(),
        description: "Run one read-only SQLite SELECT (or WITH … SELECT) query against the \
                      analytics database and return the result. A single value comes back as \
                      plain text, several rows as a JSON array."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single SQLite SELECT statement without a trailing semicolon"
                }
            },
            "required": ["query"]
        }),
    }
}

/// System prompt for the tool-calling conversation.
pub fn build_system_prompt(schema: &str) -> String {
    format!(
        r#"You are Data-GPT, an analyst answering questions about a video analytics database (users, videos, per-video statistics snapshots).

To look at the data, call the `{tool}` tool with one SQLite query. You may not guess numbers: every figure in your answer must come from a tool result.

SCHEMA:
{schema}

RULES:
- Read-only: only SELECT or WITH … SELECT; never INSERT, UPDATE, DELETE, DROP, ALTER, CREATE or any other statement
- Exactly one statement per call, no semicolons
- Use only tables and columns from the schema
- Timestamps are ISO 8601 text; compare dates with date(column)
- When a date range is given in the context, filter with date(column) BETWEEN start AND end (inclusive)
- Use COUNT/SUM/AVG/MIN/MAX for counting and totals
- Lists without LIMIT are cut to {limit} rows
- If a query fails, read the error, fix the query and call the tool again

RESPONSE FORMAT:
- Answer in Russian, briefly, as plain text without markdown tables
- If the result is a single number, answer with the number and a short phrase

EXAMPLE:
Question: {example_q}
Tool call: {tool}({{"query": "{example_sql}"}})
Tool result: 17
Answer: Всего 17 пользователей."#,
        tool = RUN_SQL_TOOL,
        schema = schema,
        limit = DEFAULT_ROW_LIMIT,
        example_q = EXAMPLE_QUESTION,
        example_sql = EXAMPLE_SQL,
    )
}

/// System prompt for direct text-to-SQL: the reply is the query itself.
pub fn build_text_to_sql_prompt(schema: &str) -> String {
    format!(
        r#"You are a SQLite query generator for a video analytics database.

Given the database schema below, convert the user's question into a single SQLite SELECT query.

SCHEMA:
{schema}

RULES:
- Output ONLY the SQL query, nothing else
- No markdown, no explanation, no backticks, no semicolon
- Only SELECT or WITH … SELECT (never INSERT, UPDATE, DELETE, DROP)
- Use only tables and columns from the schema
- When a date range is given in the context, filter with date(column) BETWEEN start AND end (inclusive)
- Always use COUNT(*) for counting questions
- Default LIMIT {limit} unless the user asks otherwise

EXAMPLE:
Question: {example_q}
SQL: {example_sql}"#,
        schema = schema,
        limit = DEFAULT_ROW_LIMIT,
        example_q = EXAMPLE_QUESTION,
        example_sql = EXAMPLE_SQL,
    )
}

/// Second system message carrying side-channel context such as a date range.
pub fn context_message(extra_context: &str) -> String {
    format!("Additional context for this question: {}", extra_context)
}
