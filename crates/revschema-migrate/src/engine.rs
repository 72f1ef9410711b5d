//! Statement splitting and ordered execution.

use revschema_core::Statement;
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::{BatchFailure, Row, Transport};

/// Rows returned by [`execute_raw_query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawQueryResult {
    /// Exactly one statement ran.
    Single(Vec<Row>),
    /// Several statements ran, one row set each.
    Batch(Vec<Vec<Row>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Code,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    LineComment,
    BlockComment,
    DollarQuoted(String),
}

/// Reads a `$tag$` opener starting at `start`, if there is one.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut end = start + 1;
    while let Some(&c) = chars.get(end) {
        if c == '$' {
            let tag: String = chars[start..=end].iter().collect();
            return Some(tag);
        }
        let valid = c == '_' || c.is_alphabetic() || (end > start + 1 && c.is_ascii_digit());
        if !valid {
            return None;
        }
        end += 1;
    }
    None
}

/// Splits a script on `;`, ignoring separators inside quoted strings,
/// quoted identifiers, comments and `$tag$` bodies.
///
/// Fragments with nothing but whitespace or comments are dropped.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = State::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match &state {
            State::Code => match c {
                ';' => {
                    if has_code {
                        out.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    i += 1;
                    continue;
                }
                '-' if next == Some('-') => state = State::LineComment,
                '/' if next == Some('*') => {
                    current.push_str("/*");
                    state = State::BlockComment;
                    i += 2;
                    continue;
                }
                '\'' => {
                    state = State::SingleQuoted;
                    has_code = true;
                }
                '"' => {
                    state = State::DoubleQuoted;
                    has_code = true;
                }
                '`' => {
                    state = State::Backticked;
                    has_code = true;
                }
                '$' => {
                    has_code = true;
                    if let Some(tag) = dollar_tag(&chars, i) {
                        current.push_str(&tag);
                        i += tag.chars().count();
                        state = State::DollarQuoted(tag);
                        continue;
                    }
                }
                c if !c.is_whitespace() => has_code = true,
                _ => {}
            },
            State::SingleQuoted if c == '\'' => state = State::Code,
            State::DoubleQuoted if c == '"' => state = State::Code,
            State::Backticked if c == '`' => state = State::Code,
            State::LineComment if c == '\n' => state = State::Code,
            State::BlockComment if c == '*' && next == Some('/') => {
                current.push_str("*/");
                state = State::Code;
                i += 2;
                continue;
            }
            State::DollarQuoted(tag) => {
                let len = tag.chars().count();
                if chars.len() >= i + len && chars[i..i + len].iter().copied().eq(tag.chars()) {
                    current.push_str(tag);
                    i += len;
                    state = State::Code;
                    continue;
                }
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }

    if has_code {
        out.push(current.trim().to_string());
    }
    out
}

/// Splits `sql` and runs each statement in order on one connection.
///
/// Returns [`RawQueryResult::Single`] when exactly one statement ran.
///
/// # Errors
///
/// The first failing statement aborts the rest with [`Error::Execution`].
pub async fn execute_raw_query(transport: &dyn Transport, sql: &str) -> Result<RawQueryResult> {
    let statements = split_statements(sql);
    let mut results = run_batch(transport, &statements).await?;
    if results.len() == 1 {
        Ok(RawQueryResult::Single(results.remove(0)))
    } else {
        Ok(RawQueryResult::Batch(results))
    }
}

/// Runs statements in order on one connection, returning how many ran.
///
/// # Errors
///
/// The first failing statement aborts the rest with [`Error::Execution`].
pub async fn execute_statements(transport: &dyn Transport, statements: &[Statement]) -> Result<usize> {
    let sql: Vec<String> = statements.iter().map(|s| s.sql.clone()).collect();
    run_batch(transport, &sql).await?;
    Ok(sql.len())
}

async fn run_batch(transport: &dyn Transport, statements: &[String]) -> Result<Vec<Vec<Row>>> {
    if statements.is_empty() {
        return Ok(Vec::new());
    }
    transport.run_batch(statements).await.map_err(|failure| {
        let BatchFailure { index, error } = failure;
        let failed_sql = statements.get(index).cloned().unwrap_or_default();
        warn!(index, sql = %failed_sql, error = %error, "Statement failed, aborting remaining statements");
        Error::Execution {
            failed_index: index,
            failed_sql,
            executed: statements.iter().take(index).cloned().collect(),
            message: error.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    #[test]
    fn test_split_simple() {
        assert_eq!(
            split_statements("SELECT 1; SELECT 2;\n\n; "),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_split_respects_quotes_and_comments() {
        let sql = r#"INSERT INTO t VALUES ('a;b', "c;d"); -- trailing; comment
SELECT `x;y` /* block; comment */ FROM t"#;
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], r#"INSERT INTO t VALUES ('a;b', "c;d")"#);
        assert!(parts[1].starts_with("-- trailing; comment"));
        assert!(parts[1].ends_with("FROM t"));
    }

    #[test]
    fn test_split_respects_doubled_quotes() {
        let parts = split_statements("SELECT 'it''s; fine'; SELECT 2");
        assert_eq!(parts, vec!["SELECT 'it''s; fine'", "SELECT 2"]);
    }

    #[test]
    fn test_split_dollar_quoting() {
        let sql = "CREATE FUNCTION f() RETURNS trigger AS $body$ BEGIN NEW.x := 1; RETURN NEW; END; $body$ LANGUAGE plpgsql; SELECT $1";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("LANGUAGE plpgsql"));
        assert_eq!(parts[1], "SELECT $1");
    }

    #[test]
    fn test_split_drops_comment_only_fragments() {
        assert_eq!(split_statements("SELECT 1; -- done"), vec!["SELECT 1"]);
    }

    async fn memory() -> LocalTransport {
        LocalTransport::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_raw_query_single_and_batch() {
        let transport = memory().await;
        match execute_raw_query(&transport, "SELECT 1+1 AS data").await.unwrap() {
            RawQueryResult::Single(rows) => assert_eq!(rows[0]["data"], 2),
            RawQueryResult::Batch(_) => panic!("expected a single result"),
        }
        match execute_raw_query(&transport, "SELECT 1 AS a; SELECT 2 AS b").await.unwrap() {
            RawQueryResult::Batch(sets) => assert_eq!(sets.len(), 2),
            RawQueryResult::Single(_) => panic!("expected a batch"),
        }
    }

    #[tokio::test]
    async fn test_failure_reports_index_and_stops() {
        let transport = memory().await;
        let statements = vec![
            Statement::new("CREATE TABLE a (id INTEGER)"),
            Statement::new("CREATE TABLE a (id INTEGER)"),
            Statement::new("CREATE TABLE b (id INTEGER)"),
        ];
        let err = execute_statements(&transport, &statements).await.unwrap_err();
        match err {
            Error::Execution {
                failed_index,
                executed,
                failed_sql,
                ..
            } => {
                assert_eq!(failed_index, 1);
                assert_eq!(executed, vec!["CREATE TABLE a (id INTEGER)"]);
                assert_eq!(failed_sql, "CREATE TABLE a (id INTEGER)");
            }
            other => panic!("unexpected error: {other}"),
        }
        let rows = transport
            .fetch("SELECT name FROM sqlite_master WHERE name = 'b'")
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
