//! Instruction assembler
//!
//! Accumulates emitted instructions for one function and supports patching
//! forward jump targets. Positions are absolute instruction indices and grow
//! monotonically; `patch` only rewrites an operand previously reserved by a
//! jump emission, never inserts or removes instructions, so positions taken
//! earlier (guard ranges included) stay valid.

use crate::error::{BytecodeError, Result};
use crate::function::SourceMap;
use crate::instruction::Instruction;
use crate::operand::CodeOffset;

/// Assembler for one function's code
#[derive(Debug, Default)]
pub struct Assembler {
    instructions: Vec<Instruction>,
    source_map: SourceMap,
}

impl Assembler {
    /// Create a new empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// The address the next emitted instruction will occupy
    #[inline]
    pub fn position(&self) -> CodeOffset {
        CodeOffset(self.instructions.len() as u32)
    }

    /// Emit an instruction, returning its address
    pub fn emit(&mut self, instruction: Instruction) -> CodeOffset {
        let at = self.position();
        self.instructions.push(instruction);
        at
    }

    /// Emit an unconditional jump with a placeholder target, returning its
    /// address for later patching
    pub fn emit_jump(&mut self) -> CodeOffset {
        self.emit(Instruction::Jump {
            target: CodeOffset(u32::MAX),
        })
    }

    /// Emit a pop-and-branch-if-falsy jump with a placeholder target
    pub fn emit_jump_if_false(&mut self) -> CodeOffset {
        self.emit(Instruction::JumpIfFalse {
            target: CodeOffset(u32::MAX),
        })
    }

    /// Emit a pop-and-branch-if-truthy jump with a placeholder target
    pub fn emit_jump_if_true(&mut self) -> CodeOffset {
        self.emit(Instruction::JumpIfTrue {
            target: CodeOffset(u32::MAX),
        })
    }

    /// Rewrite the target of a previously emitted jump
    pub fn patch(&mut self, at: CodeOffset, target: CodeOffset) -> Result<()> {
        let ins = self
            .instructions
            .get_mut(at.0 as usize)
            .ok_or(BytecodeError::PatchOutOfRange(at.0))?;
        match ins {
            Instruction::Jump { target: t }
            | Instruction::JumpIfFalse { target: t }
            | Instruction::JumpIfTrue { target: t } => {
                *t = target;
                Ok(())
            }
            _ => Err(BytecodeError::BadPatch(at.0)),
        }
    }

    /// Patch a jump so it lands on the next instruction to be emitted
    pub fn patch_to_here(&mut self, at: CodeOffset) -> Result<()> {
        let here = self.position();
        self.patch(at, here)
    }

    /// Record a source location for the next instruction to be emitted
    pub fn mark_source(&mut self, line: u32, column: u32) {
        self.source_map.add(self.position().0, line, column);
    }

    /// Number of instructions emitted so far
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if no instructions have been emitted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Consume the assembler, handing off its buffer and source map
    pub fn finish(self) -> (Vec<Instruction>, SourceMap) {
        (self.instructions, self.source_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_monotonic() {
        let mut asm = Assembler::new();
        let p0 = asm.emit(Instruction::LoadNull);
        let p1 = asm.emit(Instruction::Pop);
        let p2 = asm.position();

        assert_eq!(p0, CodeOffset(0));
        assert_eq!(p1, CodeOffset(1));
        assert_eq!(p2, CodeOffset(2));
    }

    #[test]
    fn test_patch_rewrites_jump_target() {
        let mut asm = Assembler::new();
        let jump = asm.emit_jump();
        asm.emit(Instruction::LoadNull);
        let target = asm.position();
        asm.patch(jump, target).unwrap();

        let (code, _) = asm.finish();
        assert_eq!(code[0], Instruction::Jump { target });
    }

    #[test]
    fn test_patch_rejects_non_jump() {
        let mut asm = Assembler::new();
        let at = asm.emit(Instruction::Pop);
        let err = asm.patch(at, CodeOffset(0)).unwrap_err();
        assert!(matches!(err, BytecodeError::BadPatch(0)));
    }

    #[test]
    fn test_patch_rejects_out_of_range() {
        let mut asm = Assembler::new();
        let err = asm.patch(CodeOffset(9), CodeOffset(0)).unwrap_err();
        assert!(matches!(err, BytecodeError::PatchOutOfRange(9)));
    }

    #[test]
    fn test_patch_preserves_earlier_positions() {
        let mut asm = Assembler::new();
        let before = asm.emit(Instruction::LoadTrue);
        let jump = asm.emit_jump_if_false();
        let after = asm.emit(Instruction::LoadFalse);
        asm.patch_to_here(jump).unwrap();

        let (code, _) = asm.finish();
        assert_eq!(code[before.0 as usize], Instruction::LoadTrue);
        assert_eq!(code[after.0 as usize], Instruction::LoadFalse);
        assert_eq!(code.len(), 3);
    }
}
