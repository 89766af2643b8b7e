//! Bytecode execution loop
//!
//! One instruction executes per step; calls push frames onto the VM's frame
//! stack and returns pop them. Exceptions are values: a `Throw` (or a
//! runtime fault, which raises the same way) walks the live frames looking
//! for the innermost [`Guard`] whose range covers the faulting instruction.
//! On a hit, the operand stack is cleared (handlers resume at a statement
//! boundary, where the stack is empty), the exception lands in the guard's
//! slot, and execution resumes at the handler. With no hit anywhere, the
//! run ends with an uncaught-exception error carrying the frame trace.

use marten_bytecode::{Constant, ConstIndex, Guard, Instruction, Module};
use tracing::{debug, trace};

use crate::error::{StackFrame, VmError, VmResult};
use crate::value::Value;
use crate::vm::{CallFrame, MAX_STACK_DEPTH, Vm};

/// What the executed instruction asks the outer loop to do
enum Flow {
    Next,
    Call { callee: Value, args: Vec<Value> },
    Return(Value),
    Raise(Value),
}

impl Vm {
    /// Execute a module's entry function to completion
    pub fn run(&mut self, module: &Module) -> VmResult<Value> {
        let entry = module
            .entry_function()
            .ok_or_else(|| VmError::internal("module has no entry function"))?;
        self.frames.clear();
        self.frames
            .push(CallFrame::new(module.entry_point, entry.local_count));
        debug!(source = %module.source_url, "executing module");
        self.run_loop(module)
    }

    fn run_loop(&mut self, module: &Module) -> VmResult<Value> {
        loop {
            match self.step(module)? {
                Flow::Next => {}
                Flow::Call { callee, args } => self.enter_call(module, callee, args)?,
                Flow::Return(value) => {
                    self.frames.pop();
                    match self.frames.last_mut() {
                        Some(caller) => caller.stack.push(value),
                        None => return Ok(value),
                    }
                }
                Flow::Raise(exn) => self.dispatch(module, exn)?,
            }
        }
    }

    /// Execute the instruction under the current frame's program counter
    fn step(&mut self, module: &Module) -> VmResult<Flow> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| VmError::internal("no active frame"))?;
        let func = module
            .function(frame.function)
            .ok_or_else(|| VmError::internal("function index out of range"))?;
        let ins = *func
            .instructions
            .get(frame.pc)
            .ok_or_else(|| VmError::internal("program counter out of range"))?;
        frame.pc += 1;

        match ins {
            Instruction::LoadNull => frame.stack.push(Value::Null),
            Instruction::LoadTrue => frame.stack.push(Value::Bool(true)),
            Instruction::LoadFalse => frame.stack.push(Value::Bool(false)),
            Instruction::LoadInt { value } => frame.stack.push(Value::Int(value)),
            Instruction::LoadConst { idx } => {
                let value = match constant(module, idx)? {
                    Constant::Number(n) => Value::Float(*n),
                    Constant::String(s) => Value::string(s),
                };
                frame.stack.push(value);
            }
            Instruction::LoadFn { idx } => frame.stack.push(Value::Function(idx)),

            Instruction::GetLocal { slot } => {
                let value = frame
                    .locals
                    .get(slot.index() as usize)
                    .cloned()
                    .ok_or_else(|| VmError::internal("local slot out of range"))?;
                frame.stack.push(value);
            }
            Instruction::SetLocal { slot } => {
                let value = pop(frame)?;
                let target = frame
                    .locals
                    .get_mut(slot.index() as usize)
                    .ok_or_else(|| VmError::internal("local slot out of range"))?;
                *target = value;
            }
            Instruction::GetGlobal { name } => {
                let name = constant_str(module, name)?;
                match self.globals.get(name) {
                    Some(value) => {
                        let value = value.clone();
                        self.frames
                            .last_mut()
                            .ok_or_else(|| VmError::internal("no active frame"))?
                            .stack
                            .push(value);
                    }
                    None => {
                        return Ok(Flow::Raise(Value::string(format!(
                            "undefined global `{name}`"
                        ))));
                    }
                }
            }
            Instruction::SetGlobal { name } => {
                let value = pop(frame)?;
                let name = constant_str(module, name)?.to_string();
                self.globals.insert(name, value);
            }

            Instruction::Pop => {
                pop(frame)?;
            }

            Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Rem => {
                let rhs = pop(frame)?;
                let lhs = pop(frame)?;
                match arithmetic(ins, lhs, rhs) {
                    Ok(value) => frame.stack.push(value),
                    Err(fault) => return Ok(Flow::Raise(Value::string(fault))),
                }
            }
            Instruction::Neg => {
                let operand = pop(frame)?;
                match negate(operand) {
                    Ok(value) => frame.stack.push(value),
                    Err(fault) => return Ok(Flow::Raise(Value::string(fault))),
                }
            }
            Instruction::Not => {
                let operand = pop(frame)?;
                frame.stack.push(Value::Bool(!operand.is_truthy()));
            }

            Instruction::Eq | Instruction::Ne => {
                let rhs = pop(frame)?;
                let lhs = pop(frame)?;
                let eq = lhs.equals(&rhs);
                frame.stack.push(Value::Bool(if matches!(ins, Instruction::Eq) {
                    eq
                } else {
                    !eq
                }));
            }
            Instruction::Lt | Instruction::Le | Instruction::Gt | Instruction::Ge => {
                let rhs = pop(frame)?;
                let lhs = pop(frame)?;
                match relational(ins, lhs, rhs) {
                    Ok(value) => frame.stack.push(value),
                    Err(fault) => return Ok(Flow::Raise(Value::string(fault))),
                }
            }

            Instruction::Jump { target } => frame.pc = target.0 as usize,
            Instruction::JumpIfFalse { target } => {
                if !pop(frame)?.is_truthy() {
                    frame.pc = target.0 as usize;
                }
            }
            Instruction::JumpIfTrue { target } => {
                if pop(frame)?.is_truthy() {
                    frame.pc = target.0 as usize;
                }
            }

            Instruction::Call { argc } => {
                let argc = argc as usize;
                if frame.stack.len() < argc + 1 {
                    return Err(VmError::internal("operand stack underflow on call"));
                }
                let args = frame.stack.split_off(frame.stack.len() - argc);
                let callee = pop(frame)?;
                return Ok(Flow::Call { callee, args });
            }
            Instruction::Return => return Ok(Flow::Return(pop(frame)?)),
            Instruction::Throw => return Ok(Flow::Raise(pop(frame)?)),
        }

        Ok(Flow::Next)
    }

    fn enter_call(&mut self, module: &Module, callee: Value, args: Vec<Value>) -> VmResult<()> {
        match callee {
            Value::Function(idx) => {
                let func = module
                    .function(idx)
                    .ok_or_else(|| VmError::internal("function index out of range"))?;
                if args.len() != func.param_count as usize {
                    return self.dispatch(
                        module,
                        Value::string(format!(
                            "`{}` expects {} arguments, got {}",
                            func.display_name(),
                            func.param_count,
                            args.len()
                        )),
                    );
                }
                if self.frames.len() >= MAX_STACK_DEPTH {
                    return Err(VmError::StackOverflow);
                }
                let mut frame = CallFrame::new(idx, func.local_count);
                for (slot, arg) in frame.locals.iter_mut().zip(args) {
                    *slot = arg;
                }
                self.frames.push(frame);
                Ok(())
            }
            Value::Native(idx) => {
                let f = self
                    .natives
                    .get(idx as usize)
                    .ok_or_else(|| VmError::internal("native index out of range"))?;
                let result = f(&args);
                match result {
                    Ok(value) => {
                        self.frames
                            .last_mut()
                            .ok_or_else(|| VmError::internal("no active frame"))?
                            .stack
                            .push(value);
                        Ok(())
                    }
                    Err(fault) => self.dispatch(module, Value::string(fault)),
                }
            }
            other => self.dispatch(
                module,
                Value::string(format!("{} is not callable", other.type_name())),
            ),
        }
    }

    /// Walk live frames innermost-out for a guard covering the faulting
    /// instruction; unwind frames with no match. Public so a host driving
    /// the VM can inject an exception between steps.
    pub fn dispatch(&mut self, module: &Module, exn: Value) -> VmResult<()> {
        let mut unwound = Vec::new();
        while let Some(frame) = self.frames.last_mut() {
            let func = module
                .function(frame.function)
                .ok_or_else(|| VmError::internal("function index out of range"))?;
            // The pc has advanced past the faulting instruction
            let fault_pc = frame.pc.saturating_sub(1) as u32;

            if let Some(guard) = Guard::innermost(&func.guards, fault_pc) {
                trace!(
                    function = func.display_name(),
                    pc = fault_pc,
                    handler = %guard.handler,
                    "exception dispatched to guard"
                );
                frame.stack.clear();
                let slot = frame
                    .locals
                    .get_mut(guard.slot.index() as usize)
                    .ok_or_else(|| VmError::internal("guard slot out of range"))?;
                *slot = exn;
                frame.pc = guard.handler.0 as usize;
                return Ok(());
            }

            let (line, column) = func
                .source_map
                .find(fault_pc)
                .map(|e| (e.line, e.column))
                .unwrap_or((0, 0));
            unwound.push(StackFrame {
                function_name: func.display_name().to_string(),
                line,
                column,
            });
            self.frames.pop();
        }
        Err(VmError::uncaught(exn.to_string(), unwound))
    }
}

fn pop(frame: &mut CallFrame) -> VmResult<Value> {
    frame
        .stack
        .pop()
        .ok_or_else(|| VmError::internal("operand stack underflow"))
}

fn constant(module: &Module, idx: ConstIndex) -> VmResult<&Constant> {
    module
        .constants
        .get(idx.0)
        .ok_or_else(|| VmError::internal("constant index out of range"))
}

fn constant_str(module: &Module, idx: ConstIndex) -> VmResult<&str> {
    constant(module, idx)?
        .as_str()
        .ok_or_else(|| VmError::internal("name constant is not a string"))
}

/// Integer arithmetic is checked (overflow and division by zero fault);
/// mixed int/float promotes to float; `+` concatenates two strings
fn arithmetic(ins: Instruction, lhs: Value, rhs: Value) -> Result<Value, String> {
    if let (Instruction::Add, Value::Str(l), Value::Str(r)) = (ins, &lhs, &rhs) {
        return Ok(Value::string(format!("{l}{r}")));
    }

    if let (Value::Int(l), Value::Int(r)) = (&lhs, &rhs) {
        let (l, r) = (*l, *r);
        let folded = match ins {
            Instruction::Add => l.checked_add(r),
            Instruction::Sub => l.checked_sub(r),
            Instruction::Mul => l.checked_mul(r),
            Instruction::Div if r == 0 => return Err("division by zero".to_string()),
            Instruction::Div => l.checked_div(r),
            Instruction::Rem if r == 0 => return Err("division by zero".to_string()),
            Instruction::Rem => l.checked_rem(r),
            _ => None,
        };
        return folded
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string());
    }

    match (lhs.as_float(), rhs.as_float()) {
        (Some(l), Some(r)) => {
            let result = match ins {
                Instruction::Add => l + r,
                Instruction::Sub => l - r,
                Instruction::Mul => l * r,
                Instruction::Div => l / r,
                Instruction::Rem => l % r,
                _ => return Err("not an arithmetic instruction".to_string()),
            };
            Ok(Value::Float(result))
        }
        _ => Err(format!(
            "cannot apply `{}` to {} and {}",
            ins.mnemonic(),
            lhs.type_name(),
            rhs.type_name()
        )),
    }
}

fn negate(operand: Value) -> Result<Value, String> {
    match operand {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        Value::Float(n) => Ok(Value::Float(-n)),
        other => Err(format!("cannot negate {}", other.type_name())),
    }
}

/// Ordering over two ints, two strings, or mixed numerics. Any float
/// comparison involving NaN is false.
fn relational(ins: Instruction, lhs: Value, rhs: Value) -> Result<Value, String> {
    let ord = match (&lhs, &rhs) {
        (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
        (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => {
                return Err(format!(
                    "cannot compare {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ));
            }
        },
    };
    let result = ord.is_some_and(|ord| match ins {
        Instruction::Lt => ord.is_lt(),
        Instruction::Le => ord.is_le(),
        Instruction::Gt => ord.is_gt(),
        Instruction::Ge => ord.is_ge(),
        _ => false,
    });
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_int_arithmetic() {
        assert!(matches!(
            arithmetic(Instruction::Add, Value::Int(2), Value::Int(3)),
            Ok(Value::Int(5))
        ));
        assert_eq!(
            arithmetic(Instruction::Div, Value::Int(1), Value::Int(0)),
            Err("division by zero".to_string())
        );
        assert_eq!(
            arithmetic(Instruction::Add, Value::Int(i64::MAX), Value::Int(1)),
            Err("integer overflow".to_string())
        );
        assert_eq!(
            arithmetic(Instruction::Div, Value::Int(i64::MIN), Value::Int(-1)),
            Err("integer overflow".to_string())
        );
    }

    #[test]
    fn test_mixed_numerics_promote() {
        assert!(matches!(
            arithmetic(Instruction::Mul, Value::Int(2), Value::Float(1.5)),
            Ok(Value::Float(v)) if v == 3.0
        ));
        // Float division by zero follows IEEE
        assert!(matches!(
            arithmetic(Instruction::Div, Value::Float(1.0), Value::Float(0.0)),
            Ok(Value::Float(v)) if v.is_infinite()
        ));
    }

    #[test]
    fn test_string_concat_requires_both_strings() {
        assert!(matches!(
            arithmetic(Instruction::Add, Value::string("a"), Value::string("b")),
            Ok(Value::Str(s)) if &*s == "ab"
        ));
        assert!(arithmetic(Instruction::Add, Value::string("a"), Value::Int(1)).is_err());
    }

    #[test]
    fn test_relational_nan_is_false() {
        assert!(matches!(
            relational(Instruction::Lt, Value::Float(f64::NAN), Value::Float(1.0)),
            Ok(Value::Bool(false))
        ));
        assert!(matches!(
            relational(Instruction::Ge, Value::Float(f64::NAN), Value::Float(1.0)),
            Ok(Value::Bool(false))
        ));
    }

    #[test]
    fn test_relational_strings() {
        assert!(matches!(
            relational(Instruction::Lt, Value::string("abc"), Value::string("abd")),
            Ok(Value::Bool(true))
        ));
        assert!(relational(Instruction::Lt, Value::string("a"), Value::Int(1)).is_err());
    }

    #[test]
    fn test_negate_min_int_faults() {
        assert_eq!(
            negate(Value::Int(i64::MIN)),
            Err("integer overflow".to_string())
        );
        assert!(matches!(negate(Value::Int(5)), Ok(Value::Int(-5))));
    }
}
