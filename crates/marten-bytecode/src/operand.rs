//! Bytecode operands

use serde::{Deserialize, Serialize};

/// A numbered storage location for one local variable within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LocalSlot(pub u16);

impl LocalSlot {
    /// Create a new local slot
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get slot index
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// Index into the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstIndex(pub u32);

impl ConstIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into a module's function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FnIndex(pub u32);

impl FnIndex {
    /// Create a new function index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// An absolute instruction address within one function's code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CodeOffset(pub u32);

impl CodeOffset {
    /// Create a new code offset
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the instruction index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for CodeOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_slot() {
        let s = LocalSlot::new(5);
        assert_eq!(s.index(), 5);
    }

    #[test]
    fn test_code_offset_ordering() {
        assert!(CodeOffset::new(3) < CodeOffset::new(7));
    }
}
