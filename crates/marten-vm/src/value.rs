//! Runtime values

use std::fmt;
use std::sync::Arc;

use marten_bytecode::FnIndex;

/// A runtime value
///
/// The derived `PartialEq` is structural; language-level equality (with
/// int/float promotion) is [`Value::equals`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null value
    Null,
    /// A boolean
    Bool(bool),
    /// A 64-bit integer
    Int(i64),
    /// A 64-bit float
    Float(f64),
    /// An immutable string
    Str(Arc<str>),
    /// A bytecode function
    Function(FnIndex),
    /// A host-registered native function
    Native(u32),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// Only `null` and `false` are falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// The value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Native(_) => "function",
        }
    }

    /// Numeric view, promoting integers. `None` for non-numeric values.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Equality: same-type comparison, with int/float promotion. Values of
    /// different types are never equal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Str(l), Value::Str(r)) => l == r,
            (Value::Function(l), Value::Function(r)) => l == r,
            (Value::Native(l), Value::Native(r)) => l == r,
            (Value::Float(_), Value::Int(_) | Value::Float(_))
            | (Value::Int(_), Value::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Function(idx) => write!(f, "<fn #{}>", idx.0),
            Value::Native(idx) => write!(f, "<native fn #{idx}>"),
        }
    }
}
