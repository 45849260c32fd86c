//! Migration execution against a live database.
//!
//! One migration runs in one transaction, statement by statement. The first
//! failing statement rolls everything back; a rollback failure is reported
//! as its own, louder error because the database state is then unknown.

use std::path::Path;

use sqlx::postgres::PgPool;
use sqlx::Executor;

use crate::error::{Error, Result};

/// Split a script into executable statements.
///
/// Splits on `;` outside of single-quoted strings, double-quoted identifiers
/// and `--` line comments. Transaction control statements are dropped: the
/// executor owns the transaction.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_comment = false;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if in_comment {
            current.push(c);
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '-' if !in_single && !in_double && chars.peek() == Some(&'-') => {
                in_comment = true;
                current.push(c);
            }
            ';' if !in_single && !in_double => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = strip_leading_comments(raw);
    if trimmed.is_empty() {
        return;
    }
    let keyword = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();
    if matches!(keyword.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK") {
        return;
    }
    statements.push(trimmed.to_string());
}

fn strip_leading_comments(raw: &str) -> &str {
    let mut rest = raw.trim();
    while rest.starts_with("--") {
        match rest.find('\n') {
            Some(pos) => rest = rest[pos + 1..].trim(),
            None => return "",
        }
    }
    rest
}

/// First line of a statement, whitespace collapsed, truncated for log output.
pub fn summarize(statement: &str) -> String {
    let first_line = statement.lines().next().unwrap_or("");
    let collapsed: Vec<&str> = first_line.split_whitespace().collect();
    let mut summary = collapsed.join(" ");
    if summary.chars().count() > 80 {
        summary = summary.chars().take(77).collect();
        summary.push_str("...");
    }
    summary
}

/// Execute a script inside a single transaction.
///
/// Returns the execution log on success. On a statement failure the
/// transaction is rolled back and the log so far travels in the error.
pub async fn apply_up_sql(pool: &PgPool, sql: &str) -> Result<Vec<String>> {
    let statements = split_statements(sql);
    let mut log = Vec::new();

    let mut transaction = pool
        .begin()
        .await
        .map_err(|e| Error::connection(e.to_string()))?;

    let total = statements.len();
    for statement in &statements {
        log.push(format!("Executing: {}", summarize(statement)));
        match transaction.execute(statement.as_str()).await {
            Ok(_) => log.push("OK".to_string()),
            Err(e) => {
                let message = e.to_string();
                log.push(format!("FAILED: {}", message));
                // The error carries the full statement text; the log line
                // above only has the summary.
                return match transaction.rollback().await {
                    Ok(()) => Err(Error::Execution {
                        statement: statement.clone(),
                        message,
                        log,
                    }),
                    Err(rollback_err) => Err(Error::UnsafeRollback {
                        statement: statement.clone(),
                        message: rollback_err.to_string(),
                        log,
                    }),
                };
            }
        }
    }

    // Deferred constraints fire at commit time, so a commit failure is a
    // statement failure in disguise and keeps the log.
    if let Err(e) = transaction.commit().await {
        let message = e.to_string();
        log.push(format!("FAILED: {}", message));
        return Err(Error::Execution {
            statement: "COMMIT".to_string(),
            message,
            log,
        });
    }

    log.push(format!("Applied {} statements successfully", total));
    Ok(log)
}

/// Apply the `up.sql` of a migration directory.
pub async fn apply_migration_dir(pool: &PgPool, dir: &Path) -> Result<Vec<String>> {
    let sql = std::fs::read_to_string(dir.join("up.sql"))?;
    apply_up_sql(pool, &sql).await
}

/// Apply the `down.sql` of a migration directory.
pub async fn revert_migration_dir(pool: &PgPool, dir: &Path) -> Result<Vec<String>> {
    let sql = std::fs::read_to_string(dir.join("down.sql"))?;
    apply_up_sql(pool, &sql).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons() {
        let sql = "CREATE TABLE a (id int);\nDROP TABLE b;";
        let statements = split_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id int)", "DROP TABLE b"]
        );
    }

    #[test]
    fn semicolon_inside_string_literal_does_not_split() {
        let sql = "INSERT INTO t VALUES ('a;b');";
        let statements = split_statements(sql);
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn semicolon_inside_quoted_identifier_does_not_split() {
        let sql = "CREATE TABLE \"weird;name\" (id int);";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("weird;name"));
    }

    #[test]
    fn semicolon_inside_comment_does_not_split() {
        let sql = "-- note; still a comment\nCREATE TABLE a (id int);";
        let statements = split_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id int)"]);
    }

    #[test]
    fn transaction_control_is_dropped() {
        let sql = "BEGIN;\nCREATE TABLE a (id int);\nCOMMIT;";
        let statements = split_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id int)"]);
    }

    #[test]
    fn comment_only_segments_are_dropped() {
        let sql = "-- header\n\n-- another note\n;CREATE TABLE a (id int);";
        let statements = split_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id int)"]);
    }

    #[test]
    fn summarize_collapses_and_truncates() {
        assert_eq!(
            summarize("CREATE TABLE   \"users\" (\n  id int\n)"),
            "CREATE TABLE \"users\" ("
        );
        let long = format!("CREATE TABLE t ({})", "x int, ".repeat(30));
        let summary = summarize(&long);
        assert_eq!(summary.len(), 80);
        assert!(summary.ends_with("..."));
    }
}
