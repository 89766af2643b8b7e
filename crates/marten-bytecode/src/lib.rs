//! # Marten VM Bytecode
//!
//! This crate defines the bytecode format for the Marten scripting toolchain.
//!
//! ## Design Principles
//!
//! - **Stack-based**: instructions operate on a per-frame evaluation stack
//! - **Absolute targets**: jump and guard operands are instruction indices,
//!   so positions taken during assembly stay valid after patching
//! - **Static exception tables**: each function carries an immutable list of
//!   [`Guard`] records consumed by the runtime dispatcher
//! - **Serializable**: modules can be cached to disk and reloaded

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod assembler;
pub mod constant;
pub mod error;
pub mod function;
pub mod guard;
pub mod instruction;
pub mod module;
pub mod operand;

pub use assembler::Assembler;
pub use constant::{Constant, ConstantPool};
pub use error::BytecodeError;
pub use function::{Function, FunctionBuilder, SourceMap, SourceMapEntry};
pub use guard::Guard;
pub use instruction::Instruction;
pub use module::Module;
pub use operand::{CodeOffset, ConstIndex, FnIndex, LocalSlot};

/// Bytecode format version
pub const BYTECODE_VERSION: u32 = 1;

/// Magic bytes for bytecode files
pub const BYTECODE_MAGIC: [u8; 8] = *b"MARTENC\0";
