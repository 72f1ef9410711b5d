//! Identifier and value quoting.
//!
//! Templated SQL uses knex-style placeholders:
//!
//! - `?` is replaced by a quoted literal,
//! - `??` is replaced by a quoted identifier,
//! - `\?` is an escaped, literal question mark.
//!
//! A [`QueryArg::List`] expands to a comma-separated list, which is how
//! composite primary keys are rendered (`PRIMARY KEY(??)`).
//!
//! Expansion is single-pass: a `?` that appears inside an argument is never
//! interpreted as a placeholder.
//!
//! ```rust
//! use revschema_core::quote::gen_query;
//! use revschema_core::PostgresDialect;
//!
//! let sql = gen_query(
//!     &PostgresDialect::new(),
//!     "ALTER TABLE ?? ALTER COLUMN ?? SET DEFAULT ?",
//!     &["books".into(), "title".into(), "it's".into()],
//! )
//! .unwrap();
//! assert_eq!(sql, r#"ALTER TABLE "books" ALTER COLUMN "title" SET DEFAULT 'it''s'"#);
//! ```

use crate::error::{Result, SynthError};

/// Dialect-specific quoting rules.
pub trait Quoter {
    /// Quotes an identifier (table, column, constraint name).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quotes a string literal.
    fn quote_literal(&self, value: &str) -> String;
}

/// Quotes `ident` with `quote`, doubling any embedded quote character.
#[must_use]
pub fn quote_with(ident: &str, quote: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(quote);
    for ch in ident.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
    out
}

/// Quotes a literal in the ANSI style (`'` doubled).
#[must_use]
pub fn ansi_literal(value: &str) -> String {
    quote_with(value, '\'')
}

/// An argument substituted into a query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryArg {
    /// A single value or identifier.
    One(String),
    /// A list, rendered comma-separated.
    List(Vec<String>),
}

impl From<&str> for QueryArg {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for QueryArg {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<&String> for QueryArg {
    fn from(value: &String) -> Self {
        Self::One(value.clone())
    }
}

impl From<Vec<String>> for QueryArg {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<&[String]> for QueryArg {
    fn from(values: &[String]) -> Self {
        Self::List(values.to_vec())
    }
}

impl From<&[&str]> for QueryArg {
    fn from(values: &[&str]) -> Self {
        Self::List(values.iter().map(|v| (*v).to_string()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal,
    Identifier,
}

fn count_placeholders(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
            }
            '?' => {
                if chars.peek() == Some(&'?') {
                    chars.next();
                }
                count += 1;
            }
            _ => {}
        }
    }
    count
}

fn render(quoter: &(impl Quoter + ?Sized), arg: &QueryArg, token: Token) -> String {
    let quote_one = |value: &str| match token {
        Token::Literal => quoter.quote_literal(value),
        Token::Identifier => quoter.quote_identifier(value),
    };
    match arg {
        QueryArg::One(value) => quote_one(value),
        QueryArg::List(values) => values
            .iter()
            .map(|v| quote_one(v))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Expands `template`, substituting `args` in order.
///
/// # Errors
///
/// Returns [`SynthError::PlaceholderMismatch`] if the number of placeholders
/// differs from the number of arguments.
pub fn gen_query(
    quoter: &(impl Quoter + ?Sized),
    template: &str,
    args: &[QueryArg],
) -> Result<String> {
    let placeholders = count_placeholders(template);
    if placeholders != args.len() {
        return Err(SynthError::PlaceholderMismatch {
            template: template.to_string(),
            placeholders,
            args: args.len(),
        });
    }

    let mut out = String::with_capacity(template.len() + 16);
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
                out.push('?');
            }
            '?' => {
                let token = if chars.peek() == Some(&'?') {
                    chars.next();
                    Token::Identifier
                } else {
                    Token::Literal
                };
                // Counted above, so the iterator cannot run dry here.
                if let Some(arg) = args.next() {
                    out.push_str(&render(quoter, arg, token));
                }
            }
            _ => out.push(ch),
        }
    }
    Ok(out)
}
