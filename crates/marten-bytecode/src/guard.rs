//! Exception guard records
//!
//! A guard maps a protected instruction range to an exception-handler entry
//! point and a storage slot for the caught value. Guards are appended while a
//! function compiles and are immutable after hand-off to the runtime.

use serde::{Deserialize, Serialize};

use crate::operand::{CodeOffset, LocalSlot};

/// A static exception-handler record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    /// First protected instruction (inclusive)
    pub start: CodeOffset,
    /// End of the protected range (exclusive)
    pub end: CodeOffset,
    /// Handler entry point
    pub handler: CodeOffset,
    /// Slot that receives the exception value before the handler runs
    pub slot: LocalSlot,
}

impl Guard {
    /// Create a new guard record
    pub fn new(start: CodeOffset, end: CodeOffset, handler: CodeOffset, slot: LocalSlot) -> Self {
        Self {
            start,
            end,
            handler,
            slot,
        }
    }

    /// Check whether this guard protects the given instruction address
    #[inline]
    pub fn contains(&self, pc: u32) -> bool {
        self.start.0 <= pc && pc < self.end.0
    }

    /// Width of the protected range, in instructions
    #[inline]
    pub fn span(&self) -> u32 {
        self.end.0 - self.start.0
    }

    /// Check whether `other`'s range lies fully inside this guard's range
    #[inline]
    pub fn encloses(&self, other: &Guard) -> bool {
        self.start.0 <= other.start.0 && other.end.0 <= self.end.0
    }

    /// Find the innermost guard protecting `pc`: among all guards whose range
    /// contains the address, the one with the smallest span. Syntactic
    /// nesting guarantees spans of containing guards differ, so the choice is
    /// deterministic.
    pub fn innermost(guards: &[Guard], pc: u32) -> Option<&Guard> {
        guards
            .iter()
            .filter(|g| g.contains(pc))
            .min_by_key(|g| g.span())
    }

    /// Validate that every pair of guards is either disjoint or properly
    /// nested. Returns the first offending pair, if any.
    pub fn check_nesting(guards: &[Guard]) -> Option<(Guard, Guard)> {
        for (i, a) in guards.iter().enumerate() {
            for b in &guards[i + 1..] {
                let disjoint = a.end.0 <= b.start.0 || b.end.0 <= a.start.0;
                if !disjoint && !a.encloses(b) && !b.encloses(a) {
                    return Some((*a, *b));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(start: u32, end: u32, handler: u32) -> Guard {
        Guard::new(
            CodeOffset(start),
            CodeOffset(end),
            CodeOffset(handler),
            LocalSlot(0),
        )
    }

    #[test]
    fn test_contains_half_open() {
        let g = guard(2, 5, 10);
        assert!(!g.contains(1));
        assert!(g.contains(2));
        assert!(g.contains(4));
        assert!(!g.contains(5));
    }

    #[test]
    fn test_innermost_prefers_nested_guard() {
        let outer = guard(0, 20, 30);
        let inner = guard(3, 8, 25);
        let guards = [outer, inner];

        assert_eq!(Guard::innermost(&guards, 5), Some(&inner));
        assert_eq!(Guard::innermost(&guards, 10), Some(&outer));
        assert_eq!(Guard::innermost(&guards, 20), None);
    }

    #[test]
    fn test_check_nesting_accepts_disjoint_and_nested() {
        let guards = [guard(0, 20, 30), guard(3, 8, 25), guard(21, 25, 40)];
        assert_eq!(Guard::check_nesting(&guards), None);
    }

    #[test]
    fn test_check_nesting_rejects_partial_overlap() {
        let a = guard(0, 10, 30);
        let b = guard(5, 15, 40);
        assert_eq!(Guard::check_nesting(&[a, b]), Some((a, b)));
    }

    #[test]
    fn test_identical_start_different_end_is_nested() {
        let outer = guard(2, 12, 20);
        let inner = guard(2, 7, 15);
        assert!(outer.encloses(&inner));
        assert_eq!(Guard::check_nesting(&[outer, inner]), None);
        assert_eq!(Guard::innermost(&[outer, inner], 3), Some(&inner));
    }
}
