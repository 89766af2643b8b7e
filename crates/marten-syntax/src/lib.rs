//! # Marten Syntax
//!
//! Lexer, recursive-descent parser and AST for the Marten language.
//!
//! ## Pipeline
//!
//! 1. [`lexer::tokenize`] turns source text into tokens with regions
//! 2. [`parser::parse`] builds a [`ast::Program`]
//! 3. [`transform::Transformer`] passes rewrite the tree before codegen

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod region;
pub mod token;
pub mod transform;

pub use ast::{Program, Expr, ExprKind, Stmt, StmtKind};
pub use error::{SyntaxError, SyntaxResult};
pub use parser::parse;
pub use region::{Region, SourceId};
pub use token::{Token, TokenKind};
pub use transform::{ConstFold, Transformer, fold_constants};
