//! # sqlcraft-error
//!
//! Unified error handling for sqlcraft, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., StatementRejected, InferenceFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use sqlcraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::StatementRejected, "only SELECT queries are allowed")
//!         .with_operation("executor::execute")
//!         .with_context("leading_keyword", "delete"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, sqlcraft_error::Error>`
//! - External errors (rusqlite, reqwest) are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using sqlcraft Error
pub type Result<T> = std::result::Result<T, Error>;
