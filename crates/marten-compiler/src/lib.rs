//! # Marten Compiler
//!
//! Compiles a parsed Marten program to bytecode.
//!
//! ## Pipeline
//!
//! 1. Index declarations so forward references resolve
//! 2. Walk the AST, allocating local slots per lexical scope
//! 3. Emit straight-line code with static exception guards; `finally`
//!    bodies are duplicated per exit path rather than tracked at runtime

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codegen;
pub mod context;
pub mod error;

pub use codegen::{Compiler, GlobalNames, compile};
pub use error::{CompileError, CompileResult};
