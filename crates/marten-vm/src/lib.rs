//! # Marten VM
//!
//! Stack-machine interpreter for Marten bytecode.
//!
//! ## Execution model
//!
//! - One call frame per active call: locals, operand stack, pc
//! - Exceptions are plain values dispatched through each function's static
//!   guard table; there is no unwinding machinery in the bytecode itself
//! - Host integration via named globals and registered native functions

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod interpreter;
pub mod value;
pub mod vm;

pub use error::{StackFrame, UncaughtError, VmError, VmResult};
pub use value::Value;
pub use vm::{MAX_STACK_DEPTH, NativeFn, Vm};
