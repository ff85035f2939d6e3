//! Error taxonomy for the question → SQL → answer bridge.
//!
//! Library code returns these typed errors; only the binary edge wraps them
//! in `anyhow`.

use thiserror::Error;

/// The incoming question cannot be sent to the model at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("вопрос пустой")]
    Empty,
    #[error("вопрос слишком короткий (минимум {min} символа)")]
    TooShort { min: usize },
    #[error("вопрос слишком длинный (максимум {max} символов)")]
    TooLong { max: usize },
    #[error("вопрос должен быть на русском языке")]
    NotCyrillic,
}

/// A date expression matched but does not name a real period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("unknown month name '{0}'")]
    UnknownMonth(String),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("invalid calendar date {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
    #[error("date range starts after it ends ({start} > {end})")]
    ReversedRange { start: chrono::NaiveDate, end: chrono::NaiveDate },
}

/// A candidate query failed the read-only policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("query is empty")]
    Empty,
    #[error("query is longer than {max} characters")]
    TooLong { max: usize },
    #[error("only a single statement is allowed (found ';')")]
    MultipleStatements,
    #[error("only SELECT or WITH queries are allowed")]
    NotReadOnly,
    #[error("forbidden keyword '{0}' in query")]
    ForbiddenKeyword(String),
    #[error("unterminated block comment in query")]
    UnterminatedComment,
}

/// The database engine rejected or failed to run a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query execution failed: {message}")]
pub struct QueryExecutionError {
    pub message: String,
}

impl QueryExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<rusqlite::Error> for QueryExecutionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<tokio::task::JoinError> for QueryExecutionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(format!("database task aborted: {err}"))
    }
}

/// The model answered, but not in the shape the protocol requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelProtocolError {
    #[error("model response has no choices")]
    NoChoices,
    #[error("model response has no content")]
    EmptyContent,
    #[error("tool call '{id}' has malformed arguments: {reason}")]
    BadToolArguments { id: String, reason: String },
    #[error("unparsable model response: {0}")]
    Unparsable(String),
}

/// The chat-completion provider could not be reached or answered with an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no LLM provider configured")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Everything `ask_with_db` can fail with.
#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error(transparent)]
    Execution(#[from] QueryExecutionError),
    #[error(transparent)]
    Protocol(#[from] ModelProtocolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
