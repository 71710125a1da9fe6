//! # LLM Provider Interface
//!
//! A trait-based abstraction for communicating with chat-completion backends.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - One implementation, `OpenAIProvider`, speaks the OpenAI wire format and
//!   covers Azure OpenAI deployments, Groq and any OpenAI-compatible server
//! - Tool/function calling support
//! - Usage tracking

pub mod openai;

pub use openai::OpenAIProvider;

use serde::{Deserialize, Serialize};
use sqlcraft_error::{Error, ErrorKind};
use std::collections::HashMap;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn that requested tool calls; must be echoed back before the tool results
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool/function that the model can call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// Parse arguments as JSON
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        // Some models send "" instead of "{}" for argument-less calls
        if self.arguments.trim().is_empty() {
            return serde_json::from_str("{}");
        }
        serde_json::from_str(&self.arguments)
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function { name: String },
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl CompletionResponse {
    /// Plain text answer with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Invalid request
    InvalidRequest(String),
    /// Model or deployment not found
    ModelNotFound(String),
    /// Authentication failed
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::ModelNotFound(m) => write!(f, "Model not found: {}", m),
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Convert into the unified error, picking kind and retry status per variant
    pub fn into_error(self) -> Error {
        let message = self.to_string();
        let err = match &self {
            Self::Network(_) => Error::new(ErrorKind::NetworkFailed, message),
            Self::Api { status, .. } if *status >= 500 => {
                Error::new(ErrorKind::ProviderUnavailable, message)
                    .with_context("status", status.to_string())
            }
            Self::Api { status, .. } => Error::new(ErrorKind::InferenceFailed, message)
                .with_context("status", status.to_string())
                .permanent(),
            Self::Parse(_) => Error::new(ErrorKind::ParseFailed, message),
            Self::RateLimited { retry_after } => {
                let err = Error::new(ErrorKind::RateLimited, message);
                match retry_after {
                    Some(secs) => err.with_context("retry_after", secs.to_string()),
                    None => err,
                }
            }
            Self::InvalidRequest(_) => Error::invalid_argument(message),
            Self::ModelNotFound(model) => {
                let model = model.clone();
                Error::new(ErrorKind::ConfigInvalid, message).with_context("model", model)
            }
            Self::AuthenticationFailed => Error::new(ErrorKind::AuthenticationFailed, message),
            Self::Other(_) => Error::new(ErrorKind::InferenceFailed, message),
        };
        err.with_operation("provider::complete")
    }
}

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "azure", "groq")
    fn name(&self) -> &str;

    /// Get the default model (deployment name for Azure)
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        let response = self.complete(request).await?;
        response.content.ok_or_else(|| ProviderError::Other("No content in response".into()))
    }

    /// Chat with message history
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(messages);
        let response = self.complete(request).await?;
        response.content.ok_or_else(|| ProviderError::Other("No content in response".into()))
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    /// Base URL; for Azure this is the resource endpoint
    pub base_url: Option<String>,
    /// Model name; for Azure this is the deployment name
    pub default_model: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    AzureOpenAI,
    Groq,
    OpenAI,
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::AzureOpenAI => "azure",
            ProviderType::Groq => "groq",
            ProviderType::OpenAI => "openai",
            ProviderType::Local => "local",
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" | "azure-openai" => Ok(ProviderType::AzureOpenAI),
            "groq" => Ok(ProviderType::Groq),
            "openai" => Ok(ProviderType::OpenAI),
            "local" => Ok(ProviderType::Local),
            other => Err(Error::config_invalid(format!("unknown provider '{}'", other))
                .with_context("provider", other.to_string())),
        }
    }
}

pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

impl ProviderConfig {
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            provider_type: ProviderType::AzureOpenAI,
            api_key: Some(api_key.into()),
            base_url: Some(endpoint.into()),
            default_model: Some(deployment.into()),
            api_version: Some(api_version.into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
            temperature: Some(0.0),
        }
    }

    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Groq,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.groq.com/openai/v1".into()),
            default_model: Some(model.into()),
            api_version: None,
            headers: HashMap::new(),
            timeout_secs: Some(120),
            temperature: Some(0.0),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some(DEFAULT_OPENAI_MODEL.into()),
            api_version: None,
            headers: HashMap::new(),
            timeout_secs: Some(120),
            temperature: Some(0.0),
        }
    }

    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            api_version: None,
            headers: HashMap::new(),
            timeout_secs: Some(300),
            temperature: Some(0.0),
        }
    }

    /// Read credentials for `provider_type` from the process environment.
    ///
    /// Fails eagerly with `CredentialMissing`, listing every unset variable at once.
    pub fn from_env(provider_type: ProviderType) -> sqlcraft_error::Result<Self> {
        Self::from_lookup(provider_type, |key| std::env::var(key).ok())
    }

    /// Same as [`ProviderConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(provider_type: ProviderType, lookup: F) -> sqlcraft_error::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match provider_type {
            ProviderType::AzureOpenAI => {
                const VARS: [&str; 4] = [
                    "AZURE_ENDPOINT",
                    "AZURE_API_KEY",
                    "AZURE_DEPLOYMENT",
                    "AZURE_API_VERSION",
                ];
                let values: Vec<Option<String>> = VARS.iter().map(|&k| get(k)).collect();
                let missing: Vec<&str> = VARS
                    .iter()
                    .zip(&values)
                    .filter(|(_, v)| v.is_none())
                    .map(|(k, _)| *k)
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::credential_missing(&missing)
                        .with_operation("provider::from_env")
                        .with_context("provider", "azure"));
                }
                let mut values = values.into_iter().flatten();
                match (values.next(), values.next(), values.next(), values.next()) {
                    (Some(endpoint), Some(key), Some(deployment), Some(version)) => {
                        Ok(Self::azure(endpoint, key, deployment, version))
                    }
                    _ => Err(Error::unexpected("azure credentials vanished after validation")),
                }
            }
            ProviderType::Groq => {
                let key = get("GROQ_API_KEY").ok_or_else(|| {
                    Error::credential_missing(&["GROQ_API_KEY"])
                        .with_operation("provider::from_env")
                        .with_context("provider", "groq")
                })?;
                let model = get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string());
                Ok(Self::groq(key, model))
            }
            ProviderType::OpenAI => {
                let key = get("OPENAI_API_KEY").ok_or_else(|| {
                    Error::credential_missing(&["OPENAI_API_KEY"])
                        .with_operation("provider::from_env")
                        .with_context("provider", "openai")
                })?;
                let mut config = Self::openai(key);
                if let Some(url) = get("OPENAI_BASE_URL") {
                    config.base_url = Some(url);
                }
                if let Some(model) = get("OPENAI_MODEL") {
                    config.default_model = Some(model);
                }
                Ok(config)
            }
            ProviderType::Local => {
                let url = get("LOCAL_LLM_URL").ok_or_else(|| {
                    Error::credential_missing(&["LOCAL_LLM_URL"])
                        .with_operation("provider::from_env")
                        .with_context("provider", "local")
                })?;
                let model = get("LOCAL_LLM_MODEL").unwrap_or_else(|| "llama3.3".to_string());
                Ok(Self::local(url, model))
            }
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are an SQLite expert");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content.as_deref(), Some("You are an SQLite expert"));

        let tool = ChatMessage::tool_result("call_1", "[]");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));

        let call = ToolCall { id: "call_1".into(), name: "sql_query".into(), arguments: "{}".into() };
        let asst = ChatMessage::assistant_with_tools(None, vec![call]);
        assert_eq!(asst.role, Role::Assistant);
        assert!(asst.content.is_none());
        assert_eq!(asst.tool_calls.map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_tool_call_arguments() {
        #[derive(Deserialize)]
        struct Args {
            query: String,
        }

        let call = ToolCall {
            id: "call_1".into(),
            name: "sql_query".into(),
            arguments: r#"{"query": "SELECT 1"}"#.into(),
        };
        let args: Args = call.parse_arguments().unwrap();
        assert_eq!(args.query, "SELECT 1");

        let empty = ToolCall { id: "c".into(), name: "describe_schema".into(), arguments: "".into() };
        let value: serde_json::Value = empty.parse_arguments().unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("How many users?")])
            .with_model("gpt-4o")
            .with_temperature(0.0)
            .with_max_tokens(512)
            .with_tool_choice(ToolChoice::Auto);

        assert_eq!(request.model, Some("gpt-4o".into()));
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(512));
        assert!(matches!(request.tool_choice, Some(ToolChoice::Auto)));
    }

    #[test]
    fn test_azure_from_env_reports_every_missing_variable() {
        let err = ProviderConfig::from_lookup(
            ProviderType::AzureOpenAI,
            env(&[("AZURE_ENDPOINT", "https://example.openai.azure.com"), ("AZURE_API_KEY", "  ")]),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialMissing);
        assert!(err.message().contains("AZURE_API_KEY"));
        assert!(err.message().contains("AZURE_DEPLOYMENT"));
        assert!(err.message().contains("AZURE_API_VERSION"));
        assert!(!err.message().contains("AZURE_ENDPOINT"));
    }

    #[test]
    fn test_azure_from_env() {
        let config = ProviderConfig::from_lookup(
            ProviderType::AzureOpenAI,
            env(&[
                ("AZURE_ENDPOINT", "https://example.openai.azure.com"),
                ("AZURE_API_KEY", "secret"),
                ("AZURE_DEPLOYMENT", "gpt-4o-prod"),
                ("AZURE_API_VERSION", "2024-06-01"),
            ]),
        )
        .unwrap();

        assert_eq!(config.provider_type, ProviderType::AzureOpenAI);
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-prod"));
        assert_eq!(config.api_version.as_deref(), Some("2024-06-01"));
        assert_eq!(config.temperature, Some(0.0));
    }

    #[test]
    fn test_groq_from_env_defaults_model() {
        let config =
            ProviderConfig::from_lookup(ProviderType::Groq, env(&[("GROQ_API_KEY", "gsk")])).unwrap();
        assert_eq!(config.default_model.as_deref(), Some(DEFAULT_GROQ_MODEL));

        let err = ProviderConfig::from_lookup(ProviderType::Groq, env(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialMissing);
    }

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!("Azure".parse::<ProviderType>().unwrap(), ProviderType::AzureOpenAI);
        assert_eq!("groq".parse::<ProviderType>().unwrap(), ProviderType::Groq);
        assert_eq!(
            "bedrock".parse::<ProviderType>().unwrap_err().kind(),
            ErrorKind::ConfigInvalid
        );
    }

    #[test]
    fn test_provider_error_conversion() {
        let err = ProviderError::RateLimited { retry_after: Some(7) }.into_error();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.is_retryable());
        assert_eq!(err.context_value("retry_after"), Some("7"));

        let err = ProviderError::AuthenticationFailed.into_error();
        assert!(!err.is_retryable());

        let err = ProviderError::Api { status: 503, message: "busy".into() }.into_error();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.is_retryable());

        let err = ProviderError::Api { status: 400, message: "bad".into() }.into_error();
        assert!(!err.is_retryable());
        assert_eq!(err.operation(), "provider::complete");

        let err = ProviderError::InvalidRequest("bad".into()).into_error();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_usage_tracker() {
        let mut tracker = UsageTracker::new();

        tracker.track("gpt-4o", &Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        });

        tracker.track("gpt-4o", &Usage {
            prompt_tokens: 200,
            completion_tokens: 100,
            total_tokens: 300,
        });

        assert_eq!(tracker.total_calls, 2);
        assert_eq!(tracker.total_prompt_tokens, 300);
        assert_eq!(tracker.total_completion_tokens, 150);
        assert_eq!(tracker.total_tokens(), 450);
        assert_eq!(tracker.by_model["gpt-4o"].total_tokens, 450);
    }
}
