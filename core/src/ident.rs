//! Identifier and literal sanitization (spec §4.1, component C1).
//!
//! The teacher never needs this: `drizzle-core` columns and tables are
//! compile-time typed, so an identifier that doesn't exist is a type
//! error, not a runtime concern. Here `Model`/`Field` names arrive as
//! strings from a schema value, so every identifier that reaches the
//! generated SQL has to be validated before it's embedded. Quoting style
//! follows `chiselstrike`'s datastore layer (`"{}"."{}"` double-quoted,
//! doubled-quote escaping) since both target dialects accept ANSI
//! double-quoted identifiers.

use crate::error::CompileError;
use crate::limits::MAX_IDENTIFIER_LEN;

/// Reserved words rejected as bare identifiers even though both dialects
/// would accept them quoted — matches the conservative "don't hand a
/// caller a footgun" posture the spec's identifier sanitizer calls for.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "truncate", "alter", "grant", "revoke", "union", "exec",
    "execute",
];

/// Validates and double-quotes a single identifier (column, table, or
/// alias segment). Rejects empty strings, anything over
/// [`MAX_IDENTIFIER_LEN`] bytes, control characters, and bare forbidden
/// keywords (case-insensitive).
pub fn quote_identifier(name: &str) -> Result<String, CompileError> {
    assert_safe_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Validates `name` without quoting it; used for alias generation where
/// the caller controls capitalization/prefixing.
pub fn assert_safe_identifier(name: &str) -> Result<(), CompileError> {
    if name.is_empty() {
        return Err(CompileError::ValidationError("identifier must not be empty".into()));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(CompileError::ValidationError(format!(
            "identifier `{name}` exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(CompileError::ValidationError(format!(
            "identifier `{name}` contains control characters"
        )));
    }
    if FORBIDDEN_KEYWORDS.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(CompileError::ValidationError(format!(
            "`{name}` is a reserved keyword and cannot be used as an identifier"
        )));
    }
    Ok(())
}

/// Tokens that would let a generated alias break out of its quoted
/// position or smuggle a second statement in behind it.
const FORBIDDEN_ALIAS_SUBSTRINGS: &[&str] = &["--", "/*", "*/"];

/// Validates a *generated* alias (spec §3 `AliasGenerator` invariant),
/// distinct from [`assert_safe_identifier`]: aliases are synthesized by
/// this compiler from a hint string, never taken verbatim from a caller,
/// but the hint itself (a field or model name) is still caller-supplied
/// schema data, so the same class of injection risk applies. Stricter
/// than general identifier validation: no whitespace, no quote
/// characters, no statement separator, no comment tokens.
pub fn assert_safe_alias(alias: &str) -> Result<(), CompileError> {
    assert_safe_identifier(alias)?;
    if alias.chars().any(|c| c.is_whitespace()) {
        return Err(CompileError::ValidationError(format!("alias `{alias}` contains whitespace")));
    }
    if alias.contains('"') || alias.contains('\'') || alias.contains('`') {
        return Err(CompileError::ValidationError(format!("alias `{alias}` contains a quote character")));
    }
    if alias.contains(';') {
        return Err(CompileError::ValidationError(format!("alias `{alias}` contains a statement separator")));
    }
    if FORBIDDEN_ALIAS_SUBSTRINGS.iter().any(|tok| alias.contains(tok)) {
        return Err(CompileError::ValidationError(format!("alias `{alias}` contains a comment token")));
    }
    Ok(())
}

/// Quotes a fully-qualified `table.column` reference, validating both
/// segments independently.
pub fn quote_qualified(table: &str, column: &str) -> Result<String, CompileError> {
    Ok(format!("{}.{}", quote_identifier(table)?, quote_identifier(column)?))
}

/// Quotes a table-or-alias reference optionally followed by `AS alias`.
pub fn quote_table_ref(table: &str, alias: Option<&str>) -> Result<String, CompileError> {
    let table_sql = quote_identifier(table)?;
    match alias {
        Some(a) => Ok(format!("{table_sql} AS {}", quote_identifier(a)?)),
        None => Ok(table_sql),
    }
}

/// Escapes a string for embedding as a SQL string literal. This is used
/// only for fragments the compiler itself controls (e.g. a JSON path
/// built from validated field names) — caller-supplied values always go
/// through parameter placeholders, never through this function.
pub fn sql_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifier() {
        assert_eq!(quote_identifier("users").unwrap(), "\"users\"");
    }

    #[test]
    fn escapes_embedded_quote() {
        assert_eq!(quote_identifier("weird\"name").unwrap(), "\"weird\"\"name\"");
    }

    #[test]
    fn rejects_empty() {
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn rejects_forbidden_keyword() {
        assert!(quote_identifier("DROP").is_err());
        assert!(quote_identifier("select").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(quote_identifier("na\nme").is_err());
    }

    #[test]
    fn rejects_overlong() {
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(quote_identifier(&long).is_err());
    }

    #[test]
    fn qualified_reference() {
        assert_eq!(quote_qualified("users", "id").unwrap(), "\"users\".\"id\"");
    }

    #[test]
    fn table_ref_with_alias() {
        assert_eq!(quote_table_ref("users", Some("u")).unwrap(), "\"users\" AS \"u\"");
        assert_eq!(quote_table_ref("users", None).unwrap(), "\"users\"");
    }

    #[test]
    fn string_literal_escapes_quote() {
        assert_eq!(sql_string_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn alias_rejects_whitespace() {
        assert!(assert_safe_alias("my alias").is_err());
    }

    #[test]
    fn alias_rejects_quote_characters() {
        assert!(assert_safe_alias("a\"b").is_err());
        assert!(assert_safe_alias("a'b").is_err());
    }

    #[test]
    fn alias_rejects_statement_separator() {
        assert!(assert_safe_alias("a;drop").is_err());
    }

    #[test]
    fn alias_rejects_comment_tokens() {
        assert!(assert_safe_alias("a--b").is_err());
        assert!(assert_safe_alias("a/*b*/").is_err());
    }

    #[test]
    fn alias_accepts_plain_hint() {
        assert!(assert_safe_alias("posts_0").is_ok());
    }
}
