//! Statement cleanup and the read-only allow-list.
//!
//! Model output is never parsed as SQL. It is cleaned best-effort and then
//! checked by its leading keyword only; the read-only connection in the
//! executor is what actually keeps the database unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlcraft_error::{Error, Result};

/// Leading keywords a candidate statement may start with
pub const ALLOWED_KEYWORDS: [&str; 3] = ["select", "show", "with"];

// A language tag only counts when the fence line ends right after it
static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[a-z0-9_-]*[ \t]*\r?\n").unwrap());
// Quoted strings match first so comment markers inside literals survive
static QUOTED_OR_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)'(?:[^']|'')*'|"(?:[^"]|"")*"|/\*.*?\*/|--[^\n]*"#).unwrap()
});
static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:sql\s*query|sqlite|sql)\s*:\s*").unwrap());

/// Reject anything that does not start with an allowed keyword.
pub fn check_statement(sql: &str) -> Result<()> {
    let normalized = sql.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(Error::statement_rejected("")
            .with_operation("guard::check_statement")
            .with_context("reason", "empty statement"));
    }

    if ALLOWED_KEYWORDS.iter().any(|k| normalized.starts_with(k)) {
        return Ok(());
    }

    Err(Error::statement_rejected(leading_keyword(&normalized))
        .with_operation("guard::check_statement"))
}

/// First word of the statement, lower-cased
pub fn leading_keyword(sql: &str) -> String {
    sql.trim()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Strip what models wrap around SQL: markdown fences, a `SQLQuery:` label,
/// comments and trailing semicolons.
pub fn clean_candidate(text: &str) -> String {
    let mut sql = text.trim();

    // Prefer the body of the first fenced block when there is one
    if let Some(start) = sql.find("```") {
        let after = &sql[start..];
        let body_start = FENCE_OPEN.find(after).map(|m| m.end()).unwrap_or(3);
        let body = &after[body_start..];
        sql = body.split("```").next().unwrap_or(body);
    }

    let sql = strip_comments(sql);
    let sql = LABEL.replace(&sql, "");

    sql.trim().trim_end_matches(';').trim().to_string()
}

/// Drop `--` and `/* */` comments that sit outside quoted strings
fn strip_comments(sql: &str) -> String {
    QUOTED_OR_COMMENT
        .replace_all(sql, |caps: &regex::Captures| {
            let found = &caps[0];
            if found.starts_with('\'') || found.starts_with('"') {
                found.to_string()
            } else if found.starts_with("/*") {
                " ".to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcraft_error::ErrorKind;

    #[test]
    fn test_allowed_statements() {
        assert!(check_statement("SELECT * FROM orders").is_ok());
        assert!(check_statement("  select 1").is_ok());
        assert!(check_statement("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(check_statement("SHOW TABLES").is_ok());
    }

    #[test]
    fn test_rejected_statements() {
        for sql in [
            "DELETE FROM orders",
            "drop table customers",
            "INSERT INTO customers VALUES (3, 'x', 'y')",
            "UPDATE orders SET total = 0",
            "PRAGMA writable_schema = 1",
            "ATTACH DATABASE 'x.db' AS x",
            "EXPLAIN SELECT 1",
            "(SELECT 1)",
        ] {
            let err = check_statement(sql).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StatementRejected, "{}", sql);
            assert!(!err.is_retryable());
        }

        let err = check_statement("DELETE FROM orders").unwrap_err();
        assert_eq!(err.context_value("leading_keyword"), Some("delete"));

        let err = check_statement("   ").unwrap_err();
        assert_eq!(err.context_value("reason"), Some("empty statement"));
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  Drop table x"), "drop");
        assert_eq!(leading_keyword("(SELECT 1)"), "select");
        assert_eq!(leading_keyword(""), "");
    }

    #[test]
    fn test_clean_fenced_sql() {
        let raw = "Here you go:\n```sql\nSELECT name FROM customers;\n```\nHope it helps";
        assert_eq!(clean_candidate(raw), "SELECT name FROM customers");

        let raw = "```\nSELECT 1\n```";
        assert_eq!(clean_candidate(raw), "SELECT 1");
    }

    #[test]
    fn test_clean_comments_and_label() {
        let raw = "SQLQuery: SELECT id -- the key\nFROM orders /* all of them */ WHERE total > 5;;";
        assert_eq!(clean_candidate(raw), "SELECT id \nFROM orders   WHERE total > 5");

        assert_eq!(clean_candidate("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_clean_keeps_string_literals() {
        let raw = "SELECT * FROM customers WHERE name = 'Ana'";
        assert_eq!(clean_candidate(raw), raw);

        let raw = "SELECT name FROM customers WHERE name <> 'a--b' ORDER BY id";
        assert_eq!(clean_candidate(raw), raw);

        let raw = "SELECT '/* not a comment */' AS note, \"odd--name\" FROM t";
        assert_eq!(clean_candidate(raw), raw);

        let raw = "SELECT 'it''s -- fine' AS s -- trailing note\nFROM t";
        assert_eq!(clean_candidate(raw), "SELECT 'it''s -- fine' AS s \nFROM t");
    }

    #[test]
    fn test_clean_single_line_fence() {
        assert_eq!(
            clean_candidate("```SELECT name FROM customers```"),
            "SELECT name FROM customers"
        );
        assert_eq!(clean_candidate("```sqlite  \nSELECT 2\n```"), "SELECT 2");
    }
}
