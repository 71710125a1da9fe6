//! Attempt budget and what the model is told after a failed attempt

use sqlcraft_error::{Error, ErrorKind};
use std::time::Duration;

/// Fixed attempt budget with a fixed pause between attempts. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// `max_attempts` below 1 is clamped to 1
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempt numbers, 1-based
    pub fn attempts(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.max_attempts
    }

    /// Whether another attempt follows `attempt`
    pub fn has_next(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep the fixed delay, if any
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Why the previous attempt produced no answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    /// The guard refused the statement
    Rejected { sql: String, message: String },
    /// The driver failed to run it
    Failed { sql: String, message: String },
    /// It ran and matched nothing
    Empty { sql: String },
}

impl Feedback {
    pub fn from_error(sql: impl Into<String>, err: &Error) -> Self {
        let sql = sql.into();
        let message = err.message().to_string();
        match err.kind() {
            ErrorKind::StatementRejected | ErrorKind::ReadOnlyViolation => {
                Feedback::Rejected { sql, message }
            }
            _ => Feedback::Failed { sql, message },
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Feedback::Rejected { sql, .. } | Feedback::Failed { sql, .. } | Feedback::Empty { sql } => sql,
        }
    }

    pub fn to_prompt(&self) -> String {
        match self {
            Feedback::Rejected { sql, message } => format!(
                "Your previous query was rejected: {}\nQuery: {}\n\
                 Only read-only SELECT (or WITH ... SELECT) statements are allowed.",
                message, sql
            ),
            Feedback::Failed { sql, message } => format!(
                "Your previous query failed.\nQuery: {}\nError: {}\n\
                 Fix the query so it runs on SQLite against the schema above.",
                sql, message
            ),
            Feedback::Empty { sql } => format!(
                "Your previous query returned no rows.\nQuery: {}\n\
                 Broaden the search: relax filters, compare text case-insensitively or with \
                 LIKE and wildcards, and check the sample data for how values are stored.",
                sql
            ),
        }
    }
}
