//! Scripted provider and a throwaway database for agent tests

use rusqlite::Connection;
use sqlcraft_llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderError, ToolCall,
    Usage,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

type Reply = Result<CompletionResponse, ProviderError>;

/// Replays canned replies in order, then repeats `fallback` (or fails).
/// Every request is recorded.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<CompletionResponse>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(reply(r))).collect())
    }

    pub fn repeating(response: CompletionResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User message of the `n`th request
    pub fn user_prompt(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == sqlcraft_llm::Role::User)
            .and_then(|m| m.content.clone())
            .unwrap_or_default()
    }

    pub fn request(&self, n: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => Err(ProviderError::Other("script exhausted".into())),
        }
    }
}

pub(crate) fn reply(text: &str) -> CompletionResponse {
    let mut response = CompletionResponse::text(text);
    response.model = "scripted-model".into();
    response.usage = Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    };
    response
}

pub(crate) fn tool_call(id: &str, name: &str, arguments: &str) -> CompletionResponse {
    CompletionResponse {
        id: String::new(),
        model: "scripted-model".into(),
        content: None,
        tool_calls: vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }],
        finish_reason: FinishReason::ToolCalls,
        usage: Usage::default(),
    }
}

/// customers(id, name, city) and orders(id, customer_id -> customers.id, total)
pub(crate) fn shop_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT);
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER REFERENCES customers(id),
            total REAL
        );
        INSERT INTO customers VALUES (1, 'Ana', 'Porto'), (2, 'Bruno', 'Lisbon');
        INSERT INTO orders VALUES (10, 1, 19.5), (11, 1, 5.0);
        "#,
    )
    .unwrap();
    (dir, path)
}

pub(crate) fn count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}
