//! Data-GPT: answer Russian questions about a video analytics database by
//! letting an LLM run guarded, read-only SQL.

pub mod answer;
pub mod chat;
pub mod config;
pub mod database;
pub mod date_range;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod query_engine;
pub mod question;
pub mod schema;
pub mod sql_guard;

pub use answer::reduce;
pub use database::{Database, ResultSet, Row, SqlValue};
pub use date_range::{extract_date_range, DateRange};
pub use error::{AskError, DateError, ModelProtocolError, PolicyViolation, ProviderError, QueryExecutionError, ValidationError};
pub use query_engine::QueryEngine;
pub use question::Question;
pub use schema::SchemaSummary;
pub use sql_guard::{validate_sql, ValidatedQuery};
