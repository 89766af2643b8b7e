//! Per-function compilation state
//!
//! [`FunctionContext`] owns slot allocation and the guard table for one
//! function body. Slots are allocated per lexical scope and reused once the
//! scope exits; `local_count` is the high-water mark across the whole body.
//!
//! [`Frame`] tracks the syntactic context the compiler is inside of while
//! walking statements: loops (for `break`/`continue` targets) and pending
//! `finally` bodies that early exits must run before leaving.

use marten_bytecode::{CodeOffset, Guard, LocalSlot};
use marten_syntax::{Region, Stmt};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{CompileError, CompileResult};

/// A lexical scope: name bindings plus the slot watermark to restore on exit
#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<String, LocalSlot>,
    base_slot: u16,
}

/// Slot allocation and guard accumulation for one function body
#[derive(Debug)]
pub struct FunctionContext {
    /// Display name, for diagnostics
    pub name: String,
    next_slot: u16,
    max_slots: u16,
    scopes: Vec<Scope>,
    guards: Vec<Guard>,
}

impl FunctionContext {
    /// Create a context with the parameters bound in the root scope
    pub fn new(name: impl Into<String>, params: &[String], region: Region) -> CompileResult<Self> {
        let mut ctx = Self {
            name: name.into(),
            next_slot: 0,
            max_slots: 0,
            scopes: vec![Scope::default()],
            guards: Vec::new(),
        };
        for param in params {
            ctx.declare(param, region)?;
        }
        Ok(ctx)
    }

    /// Enter a nested scope
    pub fn enter_scope(&mut self) {
        trace!(function = %self.name, depth = self.scopes.len() + 1, base = self.next_slot, "enter scope");
        self.scopes.push(Scope {
            bindings: FxHashMap::default(),
            base_slot: self.next_slot,
        });
    }

    /// Exit the current scope, releasing its slots for reuse
    pub fn exit_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            trace!(function = %self.name, depth = self.scopes.len(), released = self.next_slot - scope.base_slot, "exit scope");
            self.next_slot = scope.base_slot;
        }
    }

    /// Declare a name in the current scope
    pub fn declare(&mut self, name: &str, region: Region) -> CompileResult<LocalSlot> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::internal("declare outside any scope"))?;
        if scope.bindings.contains_key(name) {
            return Err(CompileError::duplicate(name, region));
        }
        let slot = self.alloc_slot()?;
        self.scopes
            .last_mut()
            .ok_or_else(|| CompileError::internal("declare outside any scope"))?
            .bindings
            .insert(name.to_string(), slot);
        Ok(slot)
    }

    /// Allocate an unnamed slot tied to the current scope
    pub fn alloc_temp(&mut self) -> CompileResult<LocalSlot> {
        self.alloc_slot()
    }

    fn alloc_slot(&mut self) -> CompileResult<LocalSlot> {
        let slot = LocalSlot::new(self.next_slot);
        self.next_slot = self
            .next_slot
            .checked_add(1)
            .ok_or_else(|| CompileError::TooManyLocals {
                function: self.name.clone(),
            })?;
        self.max_slots = self.max_slots.max(self.next_slot);
        Ok(slot)
    }

    /// Resolve a name against the scope chain, innermost first
    pub fn resolve(&self, name: &str) -> Option<LocalSlot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name).copied())
    }

    /// Record a guard for this function
    pub fn add_guard(&mut self, guard: Guard) {
        self.guards.push(guard);
    }

    /// Slot high-water mark: the frame size the interpreter must reserve
    pub fn local_count(&self) -> u16 {
        self.max_slots
    }

    /// Consume the context, yielding the accumulated guard table
    pub fn into_guards(self) -> Vec<Guard> {
        self.guards
    }
}

/// State for one enclosing loop
#[derive(Debug)]
pub struct LoopContext {
    /// Where `continue` jumps (condition re-evaluation)
    pub continue_target: CodeOffset,
    /// Placeholder jumps patched to the loop exit
    pub break_jumps: Vec<CodeOffset>,
}

/// A syntactic context the compiler is currently inside of
#[derive(Debug)]
pub enum Frame<'a> {
    /// An enclosing loop
    Loop(LoopContext),
    /// A pending `finally` body that early exits must run. `emitting` is set
    /// while the body is being copied, so a `return` inside the copy does
    /// not recurse into it again.
    Finally {
        /// The finally body statements
        body: &'a [Stmt],
        /// Whether a copy of this body is currently being emitted
        emitting: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use marten_syntax::SourceId;

    fn r() -> Region {
        Region::point(SourceId(0), 1, 1)
    }

    #[test]
    fn test_params_get_first_slots() {
        let ctx = FunctionContext::new("f", &["a".into(), "b".into()], r()).unwrap();
        assert_eq!(ctx.resolve("a"), Some(LocalSlot::new(0)));
        assert_eq!(ctx.resolve("b"), Some(LocalSlot::new(1)));
        assert_eq!(ctx.local_count(), 2);
    }

    #[test]
    fn test_scope_exit_releases_slots() {
        let mut ctx = FunctionContext::new("f", &[], r()).unwrap();
        ctx.enter_scope();
        let first = ctx.declare("x", r()).unwrap();
        ctx.exit_scope();
        ctx.enter_scope();
        let second = ctx.declare("y", r()).unwrap();
        ctx.exit_scope();
        assert_eq!(first, second);
        assert_eq!(ctx.local_count(), 1);
        assert_eq!(ctx.resolve("x"), None);
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let mut ctx = FunctionContext::new("f", &["x".into()], r()).unwrap();
        ctx.enter_scope();
        let inner = ctx.declare("x", r()).unwrap();
        assert_eq!(ctx.resolve("x"), Some(inner));
        ctx.exit_scope();
        assert_eq!(ctx.resolve("x"), Some(LocalSlot::new(0)));
    }

    #[test]
    fn test_duplicate_in_same_scope_errors() {
        let mut ctx = FunctionContext::new("f", &[], r()).unwrap();
        ctx.declare("x", r()).unwrap();
        assert!(matches!(
            ctx.declare("x", r()),
            Err(CompileError::DuplicateName { .. })
        ));
    }
}
