//! Compilation errors

use marten_syntax::Region;
use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Name not bound in any enclosing scope, declaration, or global
    #[error("Unresolved name `{name}` at {region}")]
    UnresolvedName {
        /// The name that failed to resolve
        name: String,
        /// Where it was referenced
        region: Region,
    },

    /// Redeclaration within the same scope
    #[error("Duplicate name `{name}` at {region}")]
    DuplicateName {
        /// The redeclared name
        name: String,
        /// Where the second declaration appears
        region: Region,
    },

    /// `break` or `continue` outside a loop, or `return` at script top level
    #[error("`{keyword}` is not allowed here ({region})")]
    MisplacedControlFlow {
        /// The offending keyword
        keyword: &'static str,
        /// Where it appears
        region: Region,
    },

    /// Too many local variables in one function
    #[error("Too many local variables in `{function}` (max 65535)")]
    TooManyLocals {
        /// The offending function
        function: String,
    },

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Unresolved-name error
    pub fn unresolved(name: impl Into<String>, region: Region) -> Self {
        Self::UnresolvedName {
            name: name.into(),
            region,
        }
    }

    /// Duplicate-name error
    pub fn duplicate(name: impl Into<String>, region: Region) -> Self {
        Self::DuplicateName {
            name: name.into(),
            region,
        }
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type for compilation operations
pub type CompileResult<T> = std::result::Result<T, CompileError>;
