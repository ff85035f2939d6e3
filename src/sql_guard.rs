//! Read-only policy for model-proposed SQL.
//!
//! Allow-list by leading keyword plus a deny-list scan of the whole text, so
//! a mutation hidden inside a CTE or subquery is still caught. This is a
//! best-effort guard; the executor also opens the store read-only.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::PolicyViolation;

pub const MAX_QUERY_CHARS: usize = 5000;
pub const DEFAULT_ROW_LIMIT: u32 = 50;

/// Verbs that must never appear as a word in a query. The first ten are the
/// generic mutating/DDL/privilege verbs; the rest are SQLite's own.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "drop", "delete", "update", "insert", "alter", "truncate", "create", "grant", "revoke", "copy",
    "attach", "detach", "pragma", "vacuum", "reindex",
];

lazy_static! {
    static ref FORBIDDEN: Regex = Regex::new(&format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|")))
        .expect("forbidden keyword pattern");
    static ref LIMIT: Regex = Regex::new(r"(?i)\blimit\b").expect("limit pattern");
    static ref AGGREGATE: Regex =
        Regex::new(r"(?i)\b(count|sum|avg|min|max)\s*\(").expect("aggregate pattern");
}

/// A query that passed [`validate_sql`]. The executor accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check `candidate` against the read-only policy and normalize it.
///
/// Queries without a `LIMIT` and without an aggregate call get
/// ` LIMIT 50` appended. Validating an already validated query returns it
/// unchanged.
pub fn validate_sql(candidate: &str) -> Result<ValidatedQuery, PolicyViolation> {
    let sql = candidate.trim();

    if sql.is_empty() {
        return Err(PolicyViolation::Empty);
    }
    if sql.chars().count() > MAX_QUERY_CHARS {
        return Err(PolicyViolation::TooLong { max: MAX_QUERY_CHARS });
    }
    if sql.contains(';') {
        return Err(PolicyViolation::MultipleStatements);
    }

    let lowered = sql.to_lowercase();
    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err(PolicyViolation::NotReadOnly);
    }

    if let Some(m) = FORBIDDEN.find(sql) {
        return Err(PolicyViolation::ForbiddenKeyword(m.as_str().to_lowercase()));
    }

    let code = without_comments(sql).ok_or(PolicyViolation::UnterminatedComment)?;
    if LIMIT.is_match(&code) || AGGREGATE.is_match(&code) {
        return Ok(ValidatedQuery(sql.to_string()));
    }

    // A trailing line comment would swallow the cap.
    let separator = if code == sql { ' ' } else { '\n' };
    debug!("Appending default LIMIT {} to query", DEFAULT_ROW_LIMIT);
    Ok(ValidatedQuery(format!("{sql}{separator}LIMIT {DEFAULT_ROW_LIMIT}")))
}

/// `sql` with `--` and `/* */` comments blanked out, quoted text left alone.
/// `None` if a block comment is never closed.
fn without_comments(sql: &str) -> Option<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('\'' | '"', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('-', Some('-')) => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                let mut closed = false;
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return None;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Strip markdown code fences the model sometimes wraps SQL in.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```SQL")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
