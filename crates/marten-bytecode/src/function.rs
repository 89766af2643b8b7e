//! Function bytecode representation

use serde::{Deserialize, Serialize};

use crate::assembler::Assembler;
use crate::guard::Guard;
use crate::instruction::Instruction;

/// A compiled bytecode function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Function name (None for the script body)
    pub name: Option<String>,

    /// Number of parameters
    pub param_count: u8,

    /// Number of local slots (including params)
    pub local_count: u16,

    /// Bytecode instructions
    pub instructions: Vec<Instruction>,

    /// Exception guard table, ordered by registration
    pub guards: Vec<Guard>,

    /// Source location mapping (instruction index -> line/column)
    pub source_map: SourceMap,
}

impl Function {
    /// Create a new function builder
    pub fn builder() -> FunctionBuilder {
        FunctionBuilder::new()
    }

    /// Get the function name or `<script>`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<script>")
    }

    /// Render the function as a disassembly listing
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "fn {} (params: {}, locals: {})",
            self.display_name(),
            self.param_count,
            self.local_count
        );
        for (i, ins) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "  {:04}  {}", i, ins);
        }
        for g in &self.guards {
            let _ = writeln!(
                out,
                "  guard [{}, {}) -> {} slot {}",
                g.start, g.end, g.handler, g.slot.0
            );
        }
        out
    }
}

/// Builder for creating functions
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    name: Option<String>,
    param_count: u8,
    local_count: u16,
    instructions: Vec<Instruction>,
    guards: Vec<Guard>,
    source_map: SourceMap,
}

impl FunctionBuilder {
    /// Create a new function builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set parameter count
    pub fn param_count(mut self, count: u8) -> Self {
        self.param_count = count;
        self
    }

    /// Set local slot count
    pub fn local_count(mut self, count: u16) -> Self {
        self.local_count = count;
        self
    }

    /// Consume an assembler's buffer as this function's code
    pub fn code(mut self, asm: Assembler) -> Self {
        let (instructions, source_map) = asm.finish();
        self.instructions = instructions;
        self.source_map = source_map;
        self
    }

    /// Set all instructions directly
    pub fn instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Add a single instruction
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Set the guard table
    pub fn guards(mut self, guards: Vec<Guard>) -> Self {
        self.guards = guards;
        self
    }

    /// Build the function
    pub fn build(self) -> Function {
        Function {
            name: self.name,
            param_count: self.param_count,
            local_count: self.local_count,
            instructions: self.instructions,
            guards: self.guards,
            source_map: self.source_map,
        }
    }
}

/// Source location mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    /// Entries mapping instruction index to source location
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Instruction index
    pub instruction_index: u32,
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
}

impl SourceMap {
    /// Create a new empty source map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry
    pub fn add(&mut self, instruction_index: u32, line: u32, column: u32) {
        self.entries.push(SourceMapEntry {
            instruction_index,
            line,
            column,
        });
    }

    /// Find the source location for an instruction index
    pub fn find(&self, instruction_index: u32) -> Option<&SourceMapEntry> {
        let idx = self
            .entries
            .binary_search_by_key(&instruction_index, |e| e.instruction_index);

        match idx {
            Ok(i) => Some(&self.entries[i]),
            Err(i) if i > 0 => Some(&self.entries[i - 1]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{CodeOffset, LocalSlot};

    #[test]
    fn test_function_builder() {
        let func = Function::builder()
            .name("add")
            .param_count(2)
            .local_count(2)
            .instruction(Instruction::GetLocal {
                slot: LocalSlot(0),
            })
            .instruction(Instruction::GetLocal {
                slot: LocalSlot(1),
            })
            .instruction(Instruction::Add)
            .instruction(Instruction::Return)
            .build();

        assert_eq!(func.display_name(), "add");
        assert_eq!(func.param_count, 2);
        assert_eq!(func.instructions.len(), 4);
        assert!(func.guards.is_empty());
    }

    #[test]
    fn test_builder_consumes_assembler() {
        let mut asm = Assembler::new();
        asm.mark_source(3, 5);
        asm.emit(Instruction::LoadNull);
        asm.emit(Instruction::Return);

        let func = Function::builder().name("f").code(asm).build();
        assert_eq!(func.instructions.len(), 2);
        assert_eq!(func.source_map.find(1).unwrap().line, 3);
    }

    #[test]
    fn test_guards_carried_verbatim() {
        let guard = Guard::new(
            CodeOffset(0),
            CodeOffset(4),
            CodeOffset(5),
            LocalSlot(1),
        );
        let func = Function::builder().guards(vec![guard]).build();
        assert_eq!(func.guards, vec![guard]);
    }

    #[test]
    fn test_source_map() {
        let mut map = SourceMap::new();
        map.add(0, 1, 1);
        map.add(5, 2, 5);
        map.add(10, 3, 1);

        assert_eq!(map.find(0).unwrap().line, 1);
        assert_eq!(map.find(5).unwrap().line, 2);
        assert_eq!(map.find(7).unwrap().line, 2); // Between entries
        assert_eq!(map.find(10).unwrap().line, 3);
    }
}
