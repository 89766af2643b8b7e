//! Runtime errors

use std::fmt;

use marten_bytecode::BytecodeError;
use thiserror::Error;

/// A frame in an uncaught-exception trace
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Display name of the function
    pub function_name: String,
    /// Source line of the faulting instruction (0 when unmapped)
    pub line: u32,
    /// Source column of the faulting instruction (0 when unmapped)
    pub column: u32,
}

/// An exception that unwound past every guard
#[derive(Debug)]
pub struct UncaughtError {
    /// The exception value, rendered
    pub message: String,
    /// Traversed frames, innermost first
    pub frames: Vec<StackFrame>,
}

impl fmt::Display for UncaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uncaught exception: {}", self.message)?;
        for frame in &self.frames {
            write!(
                f,
                "\n  at {} ({}:{})",
                frame.function_name, frame.line, frame.column
            )?;
        }
        Ok(())
    }
}

/// Runtime errors
#[derive(Debug, Error)]
pub enum VmError {
    /// An exception with no matching guard in any live frame
    #[error("{0}")]
    Uncaught(Box<UncaughtError>),

    /// Call depth exceeded the frame limit
    #[error("Stack overflow")]
    StackOverflow,

    /// Internal interpreter error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Malformed bytecode
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
}

impl VmError {
    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Uncaught-exception error
    pub fn uncaught(message: impl Into<String>, frames: Vec<StackFrame>) -> Self {
        Self::Uncaught(Box::new(UncaughtError {
            message: message.into(),
            frames,
        }))
    }
}

/// Result type for runtime operations
pub type VmResult<T> = std::result::Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncaught_display_includes_trace() {
        let err = VmError::uncaught(
            "boom",
            vec![
                StackFrame {
                    function_name: "inner".into(),
                    line: 3,
                    column: 5,
                },
                StackFrame {
                    function_name: "<script>".into(),
                    line: 1,
                    column: 1,
                },
            ],
        );
        let text = err.to_string();
        assert!(text.starts_with("Uncaught exception: boom"));
        assert!(text.contains("at inner (3:5)"));
        assert!(text.contains("at <script> (1:1)"));
    }
}
