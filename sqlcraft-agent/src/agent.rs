//! Question -> SQL -> rows -> answer, with a bounded retry loop

use crate::prompt::{self, SchemaContext};
use crate::retry::{Feedback, RetryPolicy};
use sqlcraft_db::{clean_candidate, introspect, IntrospectOptions, QueryExecutor, ResultSet, Schema};
use sqlcraft_error::{Error, ErrorKind, Result};
use sqlcraft_llm::{ChatMessage, CompletionRequest, LlmProvider, ProviderError, UsageTracker};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Returned when every attempt came back empty or broken
pub const FAILURE_MESSAGE: &str = "Could not execute the query after multiple attempts.";

/// Configuration for the query agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// SQLite file to answer from
    pub db_path: PathBuf,
    /// Attempt budget and pause between attempts
    pub retry: RetryPolicy,
    /// Ask for a plan before each SQL candidate
    pub plan_first: bool,
    /// Put one sample row per table into the prompts
    pub include_samples: bool,
    /// Hand the rows to the model for a natural-language answer.
    /// When false the framed result block is the answer.
    pub summarize: bool,
    /// Stop reading rows after this many
    pub row_cap: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/temp.db"),
            retry: RetryPolicy::default(),
            plan_first: true,
            include_samples: true,
            summarize: true,
            row_cap: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A query returned rows and the answer is built from them
    Answered,
    /// Every attempt failed or came back empty
    Exhausted,
    /// Stopped early: bad database, bad credentials and the like
    Failed,
}

/// What the user sees. Always text, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// Statement that produced the rows
    pub sql: Option<String>,
    /// Attempts (or tool steps) spent
    pub attempts: usize,
    pub outcome: Outcome,
}

impl Answer {
    pub(crate) fn answered(text: impl Into<String>, sql: Option<String>, attempts: usize) -> Self {
        Self {
            text: text.into(),
            sql,
            attempts,
            outcome: Outcome::Answered,
        }
    }

    pub(crate) fn exhausted(attempts: usize) -> Self {
        Self {
            text: FAILURE_MESSAGE.to_string(),
            sql: None,
            attempts,
            outcome: Outcome::Exhausted,
        }
    }

    pub(crate) fn failed(text: impl Into<String>, attempts: usize) -> Self {
        Self {
            text: text.into(),
            sql: None,
            attempts,
            outcome: Outcome::Failed,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.outcome == Outcome::Answered
    }

    /// Why no answer was produced, for an exhausted run
    pub fn reason(&self) -> Option<Error> {
        match self.outcome {
            Outcome::Exhausted => Some(Error::attempts_exhausted(self.attempts)),
            Outcome::Answered | Outcome::Failed => None,
        }
    }
}

/// The pipeline agent: plan, generate, execute, retry, summarize
pub struct QueryAgent<P: LlmProvider> {
    provider: P,
    config: AgentConfig,
    executor: QueryExecutor,
    usage: UsageTracker,
}

impl<P: LlmProvider> QueryAgent<P> {
    pub fn new(provider: P, config: AgentConfig) -> Self {
        let mut executor = QueryExecutor::new(&config.db_path);
        if let Some(cap) = config.row_cap {
            executor = executor.with_row_cap(cap);
        }
        Self {
            provider,
            config,
            executor,
            usage: UsageTracker::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Token usage across every question asked so far
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Answer `question` from the database. Never fails; problems become text.
    pub async fn ask(&mut self, question: &str) -> Answer {
        let question = question.trim();
        if question.is_empty() {
            return Answer::failed("Please ask a question about the database.", 0);
        }

        let options = IntrospectOptions {
            include_samples: self.config.include_samples,
        };
        let schema = match introspect(&self.config.db_path, &options) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "schema introspection failed");
                return Answer::failed(schema_diagnostic(&e), 0);
            }
        };
        let context = SchemaContext::from_schema(&schema);

        let policy = self.config.retry;
        let mut feedback: Option<Feedback> = None;

        for attempt in policy.attempts() {
            info!(attempt, max = policy.max_attempts(), "generating query");

            let sql = match self.generate(question, &context, feedback.as_ref()).await {
                Ok(sql) => sql,
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "model call failed");
                    if policy.has_next(attempt) {
                        policy.pause().await;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "model call failed, giving up");
                    return Answer::failed(format!("Error: {}", e.message()), attempt);
                }
            };
            debug!(attempt, sql = %sql, "candidate query");

            match self.executor.execute(&sql) {
                Ok(rows) if rows.is_empty() => {
                    warn!(attempt, "query returned no rows");
                    feedback = Some(Feedback::Empty { sql });
                }
                Ok(rows) => {
                    info!(attempt, rows = rows.len(), "query returned rows");
                    let text = self.summarize(question, &sql, &rows, &schema).await;
                    return Answer::answered(text, Some(sql), attempt);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "query failed");
                    feedback = Some(Feedback::from_error(sql, &e));
                }
            }

            if policy.has_next(attempt) {
                policy.pause().await;
            }
        }

        let err = Error::attempts_exhausted(policy.max_attempts()).with_operation("agent::ask");
        warn!(error = %err, "no usable result");
        Answer::exhausted(policy.max_attempts())
    }

    /// One attempt's worth of model calls: the optional plan, then the SQL
    async fn generate(
        &mut self,
        question: &str,
        context: &SchemaContext,
        feedback: Option<&Feedback>,
    ) -> Result<String> {
        let plan = if self.config.plan_first {
            let plan = self.complete_text(prompt::planning_messages(question, context)).await?;
            debug!(plan = %plan, "query plan");
            Some(plan)
        } else {
            None
        };

        let raw = self
            .complete_text(prompt::sql_messages(question, context, plan.as_deref(), feedback))
            .await?;
        Ok(clean_candidate(&raw))
    }

    async fn summarize(&mut self, question: &str, sql: &str, rows: &ResultSet, schema: &Schema) -> String {
        let block = rows.render_block();
        if !self.config.summarize {
            return block;
        }

        let messages = prompt::answer_messages(question, sql, &block, &schema.to_json());
        match self.complete_text(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "summary failed, returning raw rows");
                block
            }
        }
    }

    async fn complete_text(&mut self, messages: Vec<ChatMessage>) -> Result<String> {
        let response = self
            .provider
            .complete(CompletionRequest::new(messages))
            .await
            .map_err(ProviderError::into_error)?;

        let model = if response.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            response.model.clone()
        };
        self.usage.track(&model, &response.usage);

        response
            .content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                Error::inference_failed("model returned an empty response")
                    .with_operation("agent::complete")
            })
    }
}

/// User-facing text for a failed introspection
pub fn schema_diagnostic(err: &Error) -> String {
    let path = err.context_value("path").unwrap_or_default();
    match err.kind() {
        ErrorKind::DatabaseNotFound => format!("Database file not found: {}", path),
        ErrorKind::SchemaEmpty => format!("No tables found in database: {}", path),
        _ => format!("Schema extraction error: {}", err.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{count, reply, shop_db, ScriptedProvider};
    use sqlcraft_db::executor::RESULTS_BEGIN;

    fn config(path: &std::path::Path, attempts: usize) -> AgentConfig {
        AgentConfig {
            db_path: path.to_path_buf(),
            retry: RetryPolicy::new(attempts),
            plan_first: false,
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn test_answers_on_first_attempt() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::texts(&[
            "```sql\nSELECT name FROM customers WHERE city = 'Porto';\n```",
            "Ana lives in Porto.",
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Who lives in Porto?").await;

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.text, "Ana lives in Porto.");
        assert_eq!(answer.sql.as_deref(), Some("SELECT name FROM customers WHERE city = 'Porto'"));
        assert_eq!(answer.attempts, 1);

        let provider = agent.provider();
        assert_eq!(provider.calls(), 2);
        assert!(provider.user_prompt(0).contains("Table: customers"));
        let summary_prompt = provider.user_prompt(1);
        assert!(summary_prompt.contains(RESULTS_BEGIN));
        assert!(summary_prompt.contains("1. name: Ana"));

        assert_eq!(agent.usage().total_calls, 2);
        assert_eq!(agent.usage().total_tokens(), 30);
    }

    #[tokio::test]
    async fn test_driver_error_is_fed_back() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::texts(&[
            "SELECT nme FROM customers",
            "SELECT name FROM customers ORDER BY id",
            "Ana and Bruno.",
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("List customer names").await;

        assert!(answer.is_answered());
        assert_eq!(answer.attempts, 2);
        let retry_prompt = agent.provider().user_prompt(1);
        assert!(retry_prompt.contains("no such column: nme"));
        assert!(retry_prompt.contains("Query: SELECT nme FROM customers"));
    }

    #[tokio::test]
    async fn test_empty_result_asks_to_broaden() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::texts(&[
            "SELECT * FROM customers WHERE name = 'ana'",
            "SELECT * FROM customers WHERE name LIKE 'ana'",
            "Ana is customer 1.",
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Tell me about ana").await;

        assert_eq!(answer.attempts, 2);
        assert_eq!(answer.text, "Ana is customer 1.");
        assert!(agent.provider().user_prompt(1).contains("returned no rows"));
    }

    #[tokio::test]
    async fn test_rejected_statement_never_touches_data() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::texts(&[
            "DELETE FROM customers",
            "SELECT COUNT(*) AS n FROM customers",
            "There are 2 customers.",
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Remove every customer").await;

        assert_eq!(answer.attempts, 2);
        assert!(agent.provider().user_prompt(1).contains("was rejected"));
        assert_eq!(count(&path, "customers"), 2);
    }

    #[tokio::test]
    async fn test_exhausts_after_exactly_n_generations() {
        for attempts in [1, 3, 5] {
            let (_dir, path) = shop_db();
            let provider = ScriptedProvider::repeating(reply("SELECT * FROM customers WHERE 0"));
            let mut agent = QueryAgent::new(provider, config(&path, attempts));

            let answer = agent.ask("Anything?").await;

            assert_eq!(answer.text, FAILURE_MESSAGE);
            assert_eq!(answer.outcome, Outcome::Exhausted);
            assert_eq!(answer.attempts, attempts);
            assert_eq!(agent.provider().calls(), attempts);

            let reason = answer.reason().unwrap();
            assert_eq!(reason.kind(), ErrorKind::AttemptsExhausted);
            assert_eq!(reason.message(), format!("no answer after {} attempts", attempts));
        }
    }

    #[tokio::test]
    async fn test_plan_first_adds_one_call_per_attempt() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::repeating(reply("SELECT * FROM orders WHERE total < 0"));
        let mut agent = QueryAgent::new(
            provider,
            AgentConfig {
                plan_first: true,
                ..config(&path, 2)
            },
        );

        let answer = agent.ask("Refunds?").await;

        assert_eq!(answer.outcome, Outcome::Exhausted);
        assert_eq!(agent.provider().calls(), 4);
        assert!(agent.provider().user_prompt(0).contains("plan an efficient SQLite query"));
        assert!(agent.provider().user_prompt(1).contains("Your plan:"));
    }

    #[tokio::test]
    async fn test_missing_database_makes_no_model_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope.db");
        let mut agent = QueryAgent::new(ScriptedProvider::texts(&[]), config(&path, 3));

        let answer = agent.ask("Anything?").await;

        assert_eq!(answer.outcome, Outcome::Failed);
        assert!(answer.text.starts_with("Database file not found"));
        assert_eq!(agent.provider().calls(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_database_makes_no_model_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::File::create(&path).unwrap();
        let mut agent = QueryAgent::new(ScriptedProvider::texts(&[]), config(&path, 3));

        let answer = agent.ask("Anything?").await;

        assert!(answer.text.starts_with("No tables found"));
        assert_eq!(agent.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_question() {
        let (_dir, path) = shop_db();
        let mut agent = QueryAgent::new(ScriptedProvider::texts(&[]), config(&path, 3));
        let answer = agent.ask("   ").await;
        assert_eq!(answer.outcome, Outcome::Failed);
        assert_eq!(agent.provider().calls(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_immediately() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed)]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Anything?").await;

        assert_eq!(answer.outcome, Outcome::Failed);
        assert_eq!(answer.text, "Error: Authentication failed");
        assert_eq!(agent.provider().calls(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_consumes_an_attempt() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            Ok(reply("SELECT name FROM customers")),
            Ok(reply("Ana and Bruno.")),
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Names?").await;

        assert!(answer.is_answered());
        assert_eq!(answer.attempts, 2);
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_rows() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::new(vec![
            Ok(reply("SELECT name FROM customers ORDER BY id")),
            Err(ProviderError::Api {
                status: 400,
                message: "context too long".into(),
            }),
        ]);
        let mut agent = QueryAgent::new(provider, config(&path, 3));

        let answer = agent.ask("Names?").await;

        assert!(answer.is_answered());
        assert!(answer.text.starts_with(RESULTS_BEGIN));
        assert!(answer.text.contains("2. name: Bruno"));
    }

    #[tokio::test]
    async fn test_raw_mode_skips_summary() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::texts(&["SELECT id FROM orders ORDER BY id"]);
        let mut agent = QueryAgent::new(
            provider,
            AgentConfig {
                summarize: false,
                ..config(&path, 3)
            },
        );

        let answer = agent.ask("Order ids?").await;

        assert!(answer.text.contains("1. id: 10\n2. id: 11\n"));
        assert_eq!(agent.provider().calls(), 1);
    }
}
