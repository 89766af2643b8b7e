//! Syntax errors

use thiserror::Error;

use crate::region::Region;

/// A lexical or parse error with source attribution
#[derive(Debug, Error)]
#[error("Syntax error at {region}: {message}")]
pub struct SyntaxError {
    /// Error message
    pub message: String,
    /// Source region the error points at
    pub region: Region,
}

impl SyntaxError {
    /// Create a new syntax error
    pub fn new(message: impl Into<String>, region: Region) -> Self {
        Self {
            message: message.into(),
            region,
        }
    }
}

/// Result type for syntax operations
pub type SyntaxResult<T> = std::result::Result<T, SyntaxError>;
