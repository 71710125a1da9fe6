//! Tool-calling agent: the model drives the loop through `sql_query` and
//! `describe_schema`.

use crate::agent::Answer;
use crate::prompt;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlcraft_db::{clean_candidate, schema_info, QueryExecutor};
use sqlcraft_error::Error;
use sqlcraft_llm::{
    ChatMessage, CompletionRequest, LlmProvider, ProviderError, ToolChoice, ToolDefinition,
    UsageTracker,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const QUERY_TOOL: &str = "sql_query";
pub const SCHEMA_TOOL: &str = "describe_schema";

const NO_RESULTS: &str = "Query executed successfully, but returned no results.";

/// Something the model can call. Output is JSON sent back verbatim as the
/// tool result; failures are reported inside it, never raised.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    fn call(&self, arguments: &str) -> Value;
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

/// Runs one read-only statement and returns its rows as records.
/// The first record (or the error entry) carries `_schema_info`.
pub struct QueryTool {
    executor: QueryExecutor,
}

impl QueryTool {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    pub fn run(&self, query: &str) -> Value {
        let schema = schema_info(self.executor.path());
        match self.executor.execute(&clean_candidate(query)) {
            Ok(rows) if rows.is_empty() => json!([{
                "message": NO_RESULTS,
                "_schema_info": schema,
            }]),
            Ok(rows) => {
                let mut records = rows.to_json();
                if let Some(Value::Object(first)) = records.get_mut(0) {
                    first.insert("_schema_info".to_string(), schema);
                }
                records
            }
            Err(e) => {
                debug!(error = %e, "sql_query failed");
                json!([{ "error": e.message(), "_schema_info": schema }])
            }
        }
    }
}

impl Tool for QueryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            QUERY_TOOL,
            "Execute a read-only SQLite query (SELECT or WITH ... SELECT) and return the rows \
             as JSON records. The first record also carries the database schema.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single SQLite SELECT statement"
                }
            },
            "required": ["query"]
        }))
    }

    fn call(&self, arguments: &str) -> Value {
        match serde_json::from_str::<QueryArgs>(arguments) {
            Ok(args) => self.run(&args.query),
            Err(e) => {
                let err = Error::tool_arguments_invalid(QUERY_TOOL, format!("invalid arguments: {}", e));
                json!([{ "error": err.message() }])
            }
        }
    }
}

/// Tables, columns, keys and foreign keys as JSON
pub struct SchemaTool {
    path: PathBuf,
}

impl SchemaTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Tool for SchemaTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            SCHEMA_TOOL,
            "Describe every table in the database: columns, primary keys and foreign keys.",
        )
    }

    fn call(&self, _arguments: &str) -> Value {
        schema_info(&self.path)
    }
}

/// Tools by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sql_query` and `describe_schema` over one database file
    pub fn for_database(path: &Path, row_cap: Option<usize>) -> Self {
        let mut executor = QueryExecutor::new(path);
        if let Some(cap) = row_cap {
            executor = executor.with_row_cap(cap);
        }
        Self::new()
            .with(QueryTool::new(executor))
            .with(SchemaTool::new(path))
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn call(&self, name: &str, arguments: &str) -> Value {
        match self.tools.iter().find(|t| t.definition().name == name) {
            Some(tool) => tool.call(arguments),
            None => json!({ "error": Error::tool_unknown(name).message() }),
        }
    }
}

/// Lets the model call tools until it answers in plain text or runs out of steps
pub struct ToolAgent<P: LlmProvider> {
    provider: P,
    registry: ToolRegistry,
    max_steps: usize,
    usage: UsageTracker,
}

impl<P: LlmProvider> ToolAgent<P> {
    pub fn new(provider: P, registry: ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            max_steps: 5,
            usage: UsageTracker::new(),
        }
    }

    /// Model round trips allowed per question, at least 1
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps.max(1);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub async fn ask(&mut self, question: &str) -> Answer {
        let question = question.trim();
        if question.is_empty() {
            return Answer::failed("Please ask a question about the database.", 0);
        }

        let tools = self.registry.definitions();
        let mut messages = vec![
            ChatMessage::system(prompt::tool_system_prompt()),
            ChatMessage::user(question),
        ];
        let mut last_sql: Option<String> = None;

        for step in 1..=self.max_steps {
            info!(step, max = self.max_steps, "asking model");
            let request = CompletionRequest::new(messages.clone())
                .with_tools(tools.clone())
                .with_tool_choice(ToolChoice::Auto);

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    let err = ProviderError::into_error(e);
                    if err.is_retryable() && step < self.max_steps {
                        warn!(step, error = %err, "model call failed");
                        continue;
                    }
                    warn!(step, error = %err, "model call failed, giving up");
                    return Answer::failed(format!("Error: {}", err.message()), step);
                }
            };

            let model = if response.model.is_empty() {
                self.provider.default_model().to_string()
            } else {
                response.model.clone()
            };
            self.usage.track(&model, &response.usage);

            if !response.has_tool_calls() {
                let text = response.content.as_deref().unwrap_or_default().trim();
                if text.is_empty() {
                    warn!(step, "empty response without tool calls");
                    continue;
                }
                return Answer::answered(text, last_sql, step);
            }

            messages.push(ChatMessage::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                info!(tool = %call.name, "calling tool");
                if call.name == QUERY_TOOL {
                    if let Ok(args) = call.parse_arguments::<QueryArgs>() {
                        last_sql = Some(clean_candidate(&args.query));
                    }
                }
                let output = self.registry.call(&call.name, &call.arguments);
                messages.push(ChatMessage::tool_result(&call.id, output.to_string()));
            }
        }

        let err = Error::attempts_exhausted(self.max_steps).with_operation("tool_agent::ask");
        warn!(error = %err, "no answer within step budget");
        Answer::exhausted(self.max_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Outcome, FAILURE_MESSAGE};
    use crate::testing::{count, reply, shop_db, tool_call, ScriptedProvider};
    use sqlcraft_llm::Role;

    #[test]
    fn test_query_tool_attaches_schema_to_first_record() {
        let (_dir, path) = shop_db();
        let tool = QueryTool::new(QueryExecutor::new(&path));

        let out = tool.call(r#"{"query": "SELECT name FROM customers ORDER BY id"}"#);
        let records = out.as_array().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Ana");
        assert!(records[0]["_schema_info"]["customers"].is_object());
        assert!(records[1].get("_schema_info").is_none());
    }

    #[test]
    fn test_query_tool_empty_and_errors() {
        let (_dir, path) = shop_db();
        let tool = QueryTool::new(QueryExecutor::new(&path));

        let out = tool.run("SELECT * FROM orders WHERE total > 1000");
        assert_eq!(out[0]["message"], NO_RESULTS);
        assert!(out[0]["_schema_info"].is_object());

        let out = tool.run("DROP TABLE orders");
        assert!(out[0]["error"].as_str().unwrap().starts_with("invalid query"));
        assert!(out[0]["_schema_info"]["orders"].is_object());
        assert_eq!(count(&path, "orders"), 2);

        let out = tool.run("SELECT nme FROM customers");
        assert!(out[0]["error"].as_str().unwrap().contains("no such column"));

        let out = tool.call(r#"{"sql": "SELECT 1"}"#);
        assert!(out[0]["error"].as_str().unwrap().starts_with("invalid arguments"));
    }

    #[test]
    fn test_registry() {
        let (_dir, path) = shop_db();
        let registry = ToolRegistry::for_database(&path, None);

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![QUERY_TOOL, SCHEMA_TOOL]);

        let schema = registry.call(SCHEMA_TOOL, "");
        assert!(schema["orders"].is_object());

        let out = registry.call("drop_everything", "{}");
        assert_eq!(out, json!({"error": "unknown tool 'drop_everything'"}));
    }

    #[tokio::test]
    async fn test_tool_loop_answers() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("call_1", QUERY_TOOL, r#"{"query": "SELECT COUNT(*) AS n FROM orders"}"#)),
            Ok(reply("There are 2 orders.")),
        ]);
        let mut agent = ToolAgent::new(provider, ToolRegistry::for_database(&path, None));

        let answer = agent.ask("How many orders?").await;

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.text, "There are 2 orders.");
        assert_eq!(answer.sql.as_deref(), Some("SELECT COUNT(*) AS n FROM orders"));
        assert_eq!(answer.attempts, 2);

        let second = agent.provider().request(1);
        assert_eq!(second.tools.as_ref().map(Vec::len), Some(2));
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.as_deref().unwrap().contains("\"n\":2"));
    }

    #[tokio::test]
    async fn test_tool_loop_step_budget() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::repeating(tool_call(
            "call_x",
            QUERY_TOOL,
            r#"{"query": "SELECT * FROM customers WHERE 0"}"#,
        ));
        let mut agent = ToolAgent::new(provider, ToolRegistry::for_database(&path, None)).with_max_steps(3);

        let answer = agent.ask("Anything?").await;

        assert_eq!(answer.text, FAILURE_MESSAGE);
        assert_eq!(answer.outcome, Outcome::Exhausted);
        assert_eq!(agent.provider().calls(), 3);
        assert_eq!(
            answer.reason().map(|e| e.kind()),
            Some(sqlcraft_error::ErrorKind::AttemptsExhausted)
        );
    }

    #[tokio::test]
    async fn test_tool_loop_malformed_arguments_go_back_to_model() {
        let (_dir, path) = shop_db();
        let provider = ScriptedProvider::new(vec![
            Ok(tool_call("call_1", QUERY_TOOL, "{not json")),
            Ok(reply("Sorry, I could not run that.")),
        ]);
        let mut agent = ToolAgent::new(provider, ToolRegistry::for_database(&path, None));

        let answer = agent.ask("How many orders?").await;

        assert!(answer.is_answered());
        assert!(answer.sql.is_none());
        let tool_msg = agent.provider().request(1).messages.last().cloned().unwrap();
        assert!(tool_msg.content.unwrap().contains("invalid arguments"));
    }
}
