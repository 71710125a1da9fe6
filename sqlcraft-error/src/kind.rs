//! Error kinds for sqlcraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// A required credential (API key, endpoint, ...) is not configured
    CredentialMissing,

    // =========================================================================
    // Database errors
    // =========================================================================
    /// The SQLite file does not exist
    DatabaseNotFound,

    /// The database has no user tables
    SchemaEmpty,

    /// Reading schema metadata failed
    SchemaFailed,

    /// The statement is not an allowed read-only statement
    StatementRejected,

    /// The statement tried to write to a read-only connection
    ReadOnlyViolation,

    /// The driver failed to prepare or run the statement
    QueryFailed,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// The provider rejected our credentials
    AuthenticationFailed,

    // =========================================================================
    // Tool errors
    // =========================================================================
    /// The model asked for a tool that is not registered
    ToolUnknown,

    /// Tool arguments could not be decoded
    ToolArgumentsInvalid,

    // =========================================================================
    // Agent errors
    // =========================================================================
    /// Every attempt was used without producing an answer
    AttemptsExhausted,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    /// Invalid argument passed to function
    InvalidArgument,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::CredentialMissing => "CredentialMissing",

            // Database
            ErrorKind::DatabaseNotFound => "DatabaseNotFound",
            ErrorKind::SchemaEmpty => "SchemaEmpty",
            ErrorKind::SchemaFailed => "SchemaFailed",
            ErrorKind::StatementRejected => "StatementRejected",
            ErrorKind::ReadOnlyViolation => "ReadOnlyViolation",
            ErrorKind::QueryFailed => "QueryFailed",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // Tools
            ErrorKind::ToolUnknown => "ToolUnknown",
            ErrorKind::ToolArgumentsInvalid => "ToolArgumentsInvalid",

            // Agent
            ErrorKind::AttemptsExhausted => "AttemptsExhausted",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::InvalidArgument => "InvalidArgument",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
                | ErrorKind::QueryFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
