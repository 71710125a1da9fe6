//! # sqlcraft LLM
//!
//! Chat-completion plumbing for sqlcraft.
//!
//! ## Core Concepts
//! - **Messages**: system/user/assistant/tool turns of a conversation
//! - **Tools**: JSON-schema described functions the model may ask to call
//! - **Provider**: Trait-based LLM communication (Azure OpenAI, Groq, any OpenAI-compatible API)
//! - **Config**: credentials and endpoints, read eagerly from the environment

pub mod provider;

pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError,
    ChatMessage, Role, CompletionRequest, CompletionResponse,
    ToolDefinition, ToolCall, ToolChoice,
    FinishReason, Usage, UsageTracker,
    OpenAIProvider,
};
pub use sqlcraft_error::{Error, ErrorKind, ErrorStatus, Result};
