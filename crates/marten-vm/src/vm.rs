//! Virtual machine state
//!
//! [`Vm`] owns the global bindings, registered native functions, and the
//! call-frame stack. Execution itself lives in the interpreter module.

use marten_bytecode::FnIndex;
use rustc_hash::FxHashMap;

use crate::value::Value;

/// Maximum call-frame depth
pub const MAX_STACK_DEPTH: usize = 1000;

/// A host function callable from bytecode. Errors raise as exceptions.
pub type NativeFn = Box<dyn Fn(&[Value]) -> Result<Value, String>>;

/// One call frame: locals, operand stack, and the program counter
#[derive(Debug)]
pub(crate) struct CallFrame {
    pub function: FnIndex,
    pub pc: usize,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
}

impl CallFrame {
    pub fn new(function: FnIndex, local_count: u16) -> Self {
        Self {
            function,
            pc: 0,
            locals: vec![Value::Null; local_count as usize],
            stack: Vec::new(),
        }
    }
}

/// The Marten virtual machine
#[derive(Default)]
pub struct Vm {
    pub(crate) globals: FxHashMap<String, Value>,
    pub(crate) natives: Vec<NativeFn>,
    pub(crate) frames: Vec<CallFrame>,
}

impl Vm {
    /// Create a VM with no globals
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function under a global name
    pub fn register_native(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        let idx = self.natives.len() as u32;
        self.natives.push(Box::new(f));
        self.globals.insert(name.into(), Value::Native(idx));
    }

    /// Bind a global value
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Read a global binding
    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Names of all bound globals, for seeding the compiler's resolution set
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }
}
