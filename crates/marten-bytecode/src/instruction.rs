//! Bytecode instructions
//!
//! One enum variant per operation. Expressions compile to code that leaves
//! exactly one value on the evaluation stack; statements compile to code that
//! leaves the stack depth unchanged.

use serde::{Deserialize, Serialize};

use crate::operand::{CodeOffset, ConstIndex, FnIndex, LocalSlot};

/// A single bytecode instruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Constants ====================
    /// Push `null`
    LoadNull,
    /// Push `true`
    LoadTrue,
    /// Push `false`
    LoadFalse,
    /// Push an inline integer
    LoadInt {
        /// The integer value
        value: i64,
    },
    /// Push a value from the constant pool
    LoadConst {
        /// Constant pool index
        idx: ConstIndex,
    },
    /// Push a function value
    LoadFn {
        /// Function table index
        idx: FnIndex,
    },

    // ==================== Variables ====================
    /// Push the value of a local slot
    GetLocal {
        /// Slot index
        slot: LocalSlot,
    },
    /// Pop the stack top into a local slot
    SetLocal {
        /// Slot index
        slot: LocalSlot,
    },
    /// Push the value of a global binding
    GetGlobal {
        /// Constant pool index of the name string
        name: ConstIndex,
    },
    /// Pop the stack top into a global binding
    SetGlobal {
        /// Constant pool index of the name string
        name: ConstIndex,
    },

    // ==================== Stack ====================
    /// Discard the stack top
    Pop,

    // ==================== Arithmetic ====================
    /// Pop two values, push their sum (numeric add or string concat)
    Add,
    /// Pop two values, push their difference
    Sub,
    /// Pop two values, push their product
    Mul,
    /// Pop two values, push their quotient
    Div,
    /// Pop two values, push their remainder
    Rem,
    /// Pop one value, push its arithmetic negation
    Neg,
    /// Pop one value, push its boolean negation
    Not,

    // ==================== Comparison ====================
    /// Pop two values, push equality
    Eq,
    /// Pop two values, push inequality
    Ne,
    /// Pop two values, push less-than
    Lt,
    /// Pop two values, push less-or-equal
    Le,
    /// Pop two values, push greater-than
    Gt,
    /// Pop two values, push greater-or-equal
    Ge,

    // ==================== Control flow ====================
    /// Unconditional jump to an absolute instruction index
    Jump {
        /// Target instruction index
        target: CodeOffset,
    },
    /// Pop the stack top, jump if falsy
    JumpIfFalse {
        /// Target instruction index
        target: CodeOffset,
    },
    /// Pop the stack top, jump if truthy
    JumpIfTrue {
        /// Target instruction index
        target: CodeOffset,
    },

    // ==================== Calls ====================
    /// Pop `argc` arguments and a callee, invoke it
    Call {
        /// Number of arguments on the stack above the callee
        argc: u8,
    },
    /// Pop the stack top and return it to the caller
    Return,

    // ==================== Exceptions ====================
    /// Pop the stack top and raise it as an exception
    Throw,
}

impl Instruction {
    /// Instruction mnemonic for disassembly
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::LoadNull => "load_null",
            Self::LoadTrue => "load_true",
            Self::LoadFalse => "load_false",
            Self::LoadInt { .. } => "load_int",
            Self::LoadConst { .. } => "load_const",
            Self::LoadFn { .. } => "load_fn",
            Self::GetLocal { .. } => "get_local",
            Self::SetLocal { .. } => "set_local",
            Self::GetGlobal { .. } => "get_global",
            Self::SetGlobal { .. } => "set_global",
            Self::Pop => "pop",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Neg => "neg",
            Self::Not => "not",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Jump { .. } => "jump",
            Self::JumpIfFalse { .. } => "jump_if_false",
            Self::JumpIfTrue { .. } => "jump_if_true",
            Self::Call { .. } => "call",
            Self::Return => "return",
            Self::Throw => "throw",
        }
    }

    /// Check whether this instruction carries a patchable jump target
    #[inline]
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::JumpIfFalse { .. } | Self::JumpIfTrue { .. }
        )
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadInt { value } => write!(f, "load_int {}", value),
            Self::LoadConst { idx } => write!(f, "load_const c{}", idx.0),
            Self::LoadFn { idx } => write!(f, "load_fn f{}", idx.0),
            Self::GetLocal { slot } => write!(f, "get_local {}", slot.0),
            Self::SetLocal { slot } => write!(f, "set_local {}", slot.0),
            Self::GetGlobal { name } => write!(f, "get_global c{}", name.0),
            Self::SetGlobal { name } => write!(f, "set_global c{}", name.0),
            Self::Jump { target } => write!(f, "jump {}", target),
            Self::JumpIfFalse { target } => write!(f, "jump_if_false {}", target),
            Self::JumpIfTrue { target } => write!(f, "jump_if_true {}", target),
            Self::Call { argc } => write!(f, "call {}", argc),
            other => f.write_str(other.mnemonic()),
        }
    }
}
