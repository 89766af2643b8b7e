//! Bytecode generation
//!
//! Walks a parsed [`Program`] and emits one bytecode [`Function`] per
//! declaration plus an entry function for the script body. Expressions
//! compile to code leaving exactly one value on the operand stack;
//! statements leave the stack depth unchanged.
//!
//! ## Exception regions
//!
//! `try` statements compile to straight-line code plus static [`Guard`]
//! records; there are no runtime enter/leave instructions. A
//! `try/catch/finally` registers two guards: an inner one covering the
//! protected body, dispatching to the catch handler, and an outer one
//! covering body and handler both, dispatching to a re-raise handler that
//! runs the finally body and throws again. The jump that skips the catch
//! handler keeps the inner range strictly shorter, so guard ranges always
//! nest and the innermost-match rule in the runtime is deterministic.
//!
//! ## Finally duplication
//!
//! The finally body is re-emitted on every exit path: once for fallthrough,
//! once inline before each `return`/`break`/`continue` that leaves the
//! region, and once in the re-raise handler. An exit inside an emitted copy
//! does not re-enter the same copy (the frame is masked while emitting).

use marten_bytecode::{
    Assembler, ConstIndex, ConstantPool, FnIndex, Function, Guard, Instruction, Module,
};
use marten_syntax::Region;
use marten_syntax::ast::{
    BinaryOp, BlockFlow, Decl, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp, block_flow,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::context::{Frame, FunctionContext, LoopContext};
use crate::error::{CompileError, CompileResult};

/// The set of names the host has bound as globals before execution
#[derive(Debug, Default, Clone)]
pub struct GlobalNames(FxHashSet<String>);

impl GlobalNames {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global name
    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    /// Check whether a name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

impl<S: Into<String>> FromIterator<S> for GlobalNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Compile a program against a set of host globals
pub fn compile(
    program: &Program,
    globals: &GlobalNames,
    source_url: &str,
) -> CompileResult<Module> {
    Compiler::new(globals).compile(program, source_url)
}

/// Module-wide compilation state: the constant pool and the function table
pub struct Compiler<'p> {
    globals: &'p GlobalNames,
    constants: ConstantPool,
    fn_indices: FxHashMap<String, FnIndex>,
}

impl<'p> Compiler<'p> {
    /// Create a compiler against a set of host globals
    pub fn new(globals: &'p GlobalNames) -> Self {
        Self {
            globals,
            constants: ConstantPool::new(),
            fn_indices: FxHashMap::default(),
        }
    }

    /// Compile a program into a bytecode module. The script body becomes the
    /// entry function at index 0; declarations follow in source order.
    pub fn compile(mut self, program: &Program, source_url: &str) -> CompileResult<Module> {
        // Declarations are visible before their definition, so the whole
        // function table is indexed up front.
        let mut next = 1u32;
        for decl in &program.decls {
            match decl {
                Decl::Fn(f) => self.register_fn(f.name.clone(), f.region, &mut next)?,
                Decl::Class(c) => {
                    for m in &c.methods {
                        let qualified = format!("{}.{}", c.name, m.name);
                        self.register_fn(qualified, m.region, &mut next)?;
                    }
                }
            }
        }

        let script = FnCompiler::run(
            &mut self,
            FnSignature {
                name: None,
                class: None,
                params: &[],
                is_script: true,
                region: Region::point(marten_syntax::SourceId(0), 1, 1),
            },
            &program.body,
        )?;
        let mut functions = vec![script];

        for decl in &program.decls {
            match decl {
                Decl::Fn(f) => {
                    functions.push(FnCompiler::run(
                        &mut self,
                        FnSignature {
                            name: Some(f.name.clone()),
                            class: None,
                            params: &f.params,
                            is_script: false,
                            region: f.region,
                        },
                        &f.body,
                    )?);
                }
                Decl::Class(c) => {
                    for m in &c.methods {
                        functions.push(FnCompiler::run(
                            &mut self,
                            FnSignature {
                                name: Some(format!("{}.{}", c.name, m.name)),
                                class: Some(&c.name),
                                params: &m.params,
                                is_script: false,
                                region: m.region,
                            },
                            &m.body,
                        )?);
                    }
                }
            }
        }

        let mut builder = Module::builder(source_url);
        for function in functions {
            builder.add_function(function);
        }
        Ok(builder
            .constants(self.constants)
            .entry_point(FnIndex::new(0))
            .build())
    }

    fn register_fn(&mut self, name: String, region: Region, next: &mut u32) -> CompileResult<()> {
        if self.fn_indices.contains_key(&name) {
            return Err(CompileError::duplicate(name, region));
        }
        self.fn_indices.insert(name, FnIndex::new(*next));
        *next += 1;
        Ok(())
    }
}

/// What is being compiled: name, enclosing class, and parameters
struct FnSignature<'a> {
    name: Option<String>,
    class: Option<&'a str>,
    params: &'a [String],
    is_script: bool,
    region: Region,
}

/// Code generation for one function body
struct FnCompiler<'c, 'p, 'ast> {
    env: &'c mut Compiler<'p>,
    asm: Assembler,
    ctx: FunctionContext,
    frames: Vec<Frame<'ast>>,
    class_name: Option<&'ast str>,
    is_script: bool,
}

impl<'c, 'p, 'ast> FnCompiler<'c, 'p, 'ast> {
    fn run(
        env: &'c mut Compiler<'p>,
        sig: FnSignature<'ast>,
        body: &'ast [Stmt],
    ) -> CompileResult<Function> {
        if sig.params.len() > u8::MAX as usize {
            return Err(CompileError::internal(format!(
                "more than 255 parameters in `{}`",
                sig.name.as_deref().unwrap_or("<script>")
            )));
        }

        let display_name = sig.name.clone().unwrap_or_else(|| "<script>".to_string());
        let ctx = FunctionContext::new(display_name.clone(), sig.params, sig.region)?;
        let mut this = Self {
            env,
            asm: Assembler::new(),
            ctx,
            frames: Vec::new(),
            class_name: sig.class,
            is_script: sig.is_script,
        };

        this.compile_stmts(body)?;
        if block_flow(body) != BlockFlow::Returns {
            this.asm.emit(Instruction::LoadNull);
            this.asm.emit(Instruction::Return);
        }

        let local_count = this.ctx.local_count();
        let guards = this.ctx.into_guards();
        if let Some((a, b)) = Guard::check_nesting(&guards) {
            return Err(CompileError::internal(format!(
                "guard ranges partially overlap: [{}, {}) and [{}, {})",
                a.start, a.end, b.start, b.end
            )));
        }
        debug!(
            function = %display_name,
            instructions = this.asm.len(),
            locals = local_count,
            guards = guards.len(),
            "compiled function"
        );

        let mut builder = Function::builder()
            .param_count(sig.params.len() as u8)
            .local_count(local_count)
            .code(this.asm)
            .guards(guards);
        if let Some(name) = sig.name {
            builder = builder.name(name);
        }
        Ok(builder.build())
    }

    // ==================== Statements ====================

    /// Compile a statement list, cutting off statements that can never run
    fn compile_stmts(&mut self, stmts: &'ast [Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
            if stmt.is_control_flow_returned() || stmt.is_control_flow_interrupted() {
                break;
            }
        }
        Ok(())
    }

    /// Compile a statement list in its own lexical scope
    fn compile_scoped_block(&mut self, stmts: &'ast [Stmt]) -> CompileResult<()> {
        self.ctx.enter_scope();
        let result = self.compile_stmts(stmts);
        self.ctx.exit_scope();
        result
    }

    fn compile_stmt(&mut self, stmt: &'ast Stmt) -> CompileResult<()> {
        self.asm
            .mark_source(stmt.region.start_line, stmt.region.start_column);
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                self.compile_expr(value)?;
                let slot = self.ctx.declare(name, stmt.region)?;
                self.asm.emit(Instruction::SetLocal { slot });
            }
            StmtKind::Assign { name, value } => {
                self.compile_expr(value)?;
                if let Some(slot) = self.ctx.resolve(name) {
                    self.asm.emit(Instruction::SetLocal { slot });
                } else if self.env.globals.contains(name) {
                    let name = self.intern_string(name);
                    self.asm.emit(Instruction::SetGlobal { name });
                } else {
                    return Err(CompileError::unresolved(name, stmt.region));
                }
            }
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.asm.emit(Instruction::Pop);
            }
            StmtKind::Block(body) => self.compile_scoped_block(body)?,
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.compile_if(cond, then_body, else_body.as_deref())?,
            StmtKind::While { cond, body } => self.compile_while(cond, body)?,
            StmtKind::Break => self.compile_break(stmt.region)?,
            StmtKind::Continue => self.compile_continue(stmt.region)?,
            StmtKind::Return(value) => self.compile_return(value.as_ref(), stmt.region)?,
            StmtKind::Throw(value) => {
                self.compile_expr(value)?;
                self.asm.emit(Instruction::Throw);
            }
            StmtKind::Try {
                body,
                catch,
                finally,
            } => self.compile_try(body, catch.as_ref(), finally.as_deref())?,
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        cond: &'ast Expr,
        then_body: &'ast [Stmt],
        else_body: Option<&'ast [Stmt]>,
    ) -> CompileResult<()> {
        self.compile_expr(cond)?;
        let to_else = self.asm.emit_jump_if_false();
        self.compile_scoped_block(then_body)?;
        if let Some(else_body) = else_body {
            // No jump over the else branch when the then branch cannot
            // fall through
            let to_end = (block_flow(then_body) == BlockFlow::FallsThrough)
                .then(|| self.asm.emit_jump());
            self.patch_here(to_else)?;
            self.compile_scoped_block(else_body)?;
            if let Some(to_end) = to_end {
                self.patch_here(to_end)?;
            }
        } else {
            self.patch_here(to_else)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &'ast Expr, body: &'ast [Stmt]) -> CompileResult<()> {
        let loop_start = self.asm.position();
        self.compile_expr(cond)?;
        let exit = self.asm.emit_jump_if_false();

        self.frames.push(Frame::Loop(LoopContext {
            continue_target: loop_start,
            break_jumps: Vec::new(),
        }));
        let result = self.compile_scoped_block(body);
        let Some(Frame::Loop(loop_ctx)) = self.frames.pop() else {
            return Err(CompileError::internal("loop frame unbalanced"));
        };
        result?;

        self.asm.emit(Instruction::Jump { target: loop_start });
        self.patch_here(exit)?;
        for jump in loop_ctx.break_jumps {
            self.patch_here(jump)?;
        }
        Ok(())
    }

    fn compile_break(&mut self, region: Region) -> CompileResult<()> {
        let loop_idx = self.innermost_loop().ok_or(CompileError::MisplacedControlFlow {
            keyword: "break",
            region,
        })?;
        self.emit_pending_finallys(loop_idx + 1)?;
        let jump = self.asm.emit_jump();
        if let Some(Frame::Loop(loop_ctx)) = self.frames.get_mut(loop_idx) {
            loop_ctx.break_jumps.push(jump);
        }
        Ok(())
    }

    fn compile_continue(&mut self, region: Region) -> CompileResult<()> {
        let loop_idx = self.innermost_loop().ok_or(CompileError::MisplacedControlFlow {
            keyword: "continue",
            region,
        })?;
        self.emit_pending_finallys(loop_idx + 1)?;
        let target = match &self.frames[loop_idx] {
            Frame::Loop(loop_ctx) => loop_ctx.continue_target,
            _ => return Err(CompileError::internal("loop frame unbalanced")),
        };
        self.asm.emit(Instruction::Jump { target });
        Ok(())
    }

    fn compile_return(
        &mut self,
        value: Option<&'ast Expr>,
        region: Region,
    ) -> CompileResult<()> {
        if self.is_script {
            return Err(CompileError::MisplacedControlFlow {
                keyword: "return",
                region,
            });
        }
        match value {
            Some(expr) => self.compile_expr(expr)?,
            None => {
                self.asm.emit(Instruction::LoadNull);
            }
        }
        // Pending finally copies run between here and the Return. The value
        // waits in a temp slot so every statement boundary inside the copies
        // keeps an empty operand stack, which is what the runtime dispatcher
        // restores on a catch. A return inside a copy emits its own Return
        // first and overrides this one.
        if self.has_pending_finallys() {
            let slot = self.ctx.alloc_temp()?;
            self.asm.emit(Instruction::SetLocal { slot });
            self.emit_pending_finallys(0)?;
            self.asm.emit(Instruction::GetLocal { slot });
        }
        self.asm.emit(Instruction::Return);
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &'ast [Stmt],
        catch: Option<&'ast marten_syntax::ast::CatchClause>,
        finally: Option<&'ast [Stmt]>,
    ) -> CompileResult<()> {
        let outer_start = self.asm.position();

        if let Some(fin) = finally {
            self.frames.push(Frame::Finally {
                body: fin,
                emitting: false,
            });
        }

        let body_result = self.compile_scoped_block(body);
        let inner_end = self.asm.position();

        let catch_result = if let Some(clause) = catch {
            body_result.and_then(|()| {
                let skip = self.asm.emit_jump();
                let handler = self.asm.position();
                self.ctx.enter_scope();
                let slot = self.ctx.declare(&clause.name, clause.region)?;
                let guard = Guard::new(outer_start, inner_end, handler, slot);
                trace!(start = %guard.start, end = %guard.end, handler = %guard.handler, "catch guard");
                self.ctx.add_guard(guard);
                let result = self.compile_stmts(&clause.body);
                self.ctx.exit_scope();
                result?;
                self.patch_here(skip)
            })
        } else {
            body_result
        };

        let outer_end = self.asm.position();

        if let Some(fin) = finally {
            if !matches!(self.frames.pop(), Some(Frame::Finally { .. })) {
                return Err(CompileError::internal("finally frame unbalanced"));
            }
            catch_result?;

            // Fallthrough copy
            self.compile_scoped_block(fin)?;
            let skip = self.asm.emit_jump();

            // Re-raise handler: run the finally body, then throw the saved
            // exception again so an enclosing guard can take it.
            let handler = self.asm.position();
            self.ctx.enter_scope();
            let slot = self.ctx.alloc_temp()?;
            let guard = Guard::new(outer_start, outer_end, handler, slot);
            trace!(start = %guard.start, end = %guard.end, handler = %guard.handler, "finally guard");
            self.ctx.add_guard(guard);
            self.compile_stmts(fin)?;
            self.asm.emit(Instruction::GetLocal { slot });
            self.asm.emit(Instruction::Throw);
            self.ctx.exit_scope();
            self.patch_here(skip)?;
        } else {
            catch_result?;
        }
        Ok(())
    }

    /// Emit the finally bodies an early exit must run, innermost first,
    /// down to (but not including) frame index `down_to`
    fn emit_pending_finallys(&mut self, down_to: usize) -> CompileResult<()> {
        for i in (down_to..self.frames.len()).rev() {
            let body = match &mut self.frames[i] {
                Frame::Finally { body, emitting } if !*emitting => {
                    *emitting = true;
                    *body
                }
                _ => continue,
            };
            let result = self.compile_scoped_block(body);
            if let Some(Frame::Finally { emitting, .. }) = self.frames.get_mut(i) {
                *emitting = false;
            }
            result?;
        }
        Ok(())
    }

    fn has_pending_finallys(&self) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f, Frame::Finally { emitting: false, .. }))
    }

    fn innermost_loop(&self) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|f| matches!(f, Frame::Loop(_)))
    }

    // ==================== Expressions ====================

    fn compile_expr(&mut self, expr: &'ast Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Null => {
                self.asm.emit(Instruction::LoadNull);
            }
            ExprKind::Bool(true) => {
                self.asm.emit(Instruction::LoadTrue);
            }
            ExprKind::Bool(false) => {
                self.asm.emit(Instruction::LoadFalse);
            }
            ExprKind::Int(value) => {
                self.asm.emit(Instruction::LoadInt { value: *value });
            }
            ExprKind::Float(n) => {
                let idx = ConstIndex::new(self.env.constants.add_number(*n));
                self.asm.emit(Instruction::LoadConst { idx });
            }
            ExprKind::Str(s) => {
                let idx = ConstIndex::new(self.env.constants.add_string(s));
                self.asm.emit(Instruction::LoadConst { idx });
            }
            ExprKind::Name(name) => self.compile_name_load(name, expr.region)?,
            ExprKind::Member { class, member } => {
                let qualified = format!("{class}.{member}");
                let idx = self
                    .env
                    .fn_indices
                    .get(&qualified)
                    .copied()
                    .ok_or_else(|| CompileError::unresolved(qualified, expr.region))?;
                self.asm.emit(Instruction::LoadFn { idx });
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.asm.emit(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                });
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => self.compile_logical(*op, lhs, rhs)?,
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.asm.emit(binary_instruction(*op)?);
            }
            ExprKind::Call { callee, args } => {
                if args.len() > u8::MAX as usize {
                    return Err(CompileError::internal("more than 255 call arguments"));
                }
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.asm.emit(Instruction::Call {
                    argc: args.len() as u8,
                });
            }
        }
        Ok(())
    }

    /// Resolution order: locals, sibling methods of the enclosing class,
    /// declared functions, host globals
    fn compile_name_load(&mut self, name: &str, region: Region) -> CompileResult<()> {
        if let Some(slot) = self.ctx.resolve(name) {
            self.asm.emit(Instruction::GetLocal { slot });
            return Ok(());
        }
        if let Some(class) = self.class_name {
            let qualified = format!("{class}.{name}");
            if let Some(&idx) = self.env.fn_indices.get(&qualified) {
                self.asm.emit(Instruction::LoadFn { idx });
                return Ok(());
            }
        }
        if let Some(&idx) = self.env.fn_indices.get(name) {
            self.asm.emit(Instruction::LoadFn { idx });
            return Ok(());
        }
        if self.env.globals.contains(name) {
            let name = self.intern_string(name);
            self.asm.emit(Instruction::GetGlobal { name });
            return Ok(());
        }
        Err(CompileError::unresolved(name, region))
    }

    /// `&&` yields `false` without evaluating the right operand when the
    /// left is falsy; `||` is the mirror image with `true`
    fn compile_logical(
        &mut self,
        op: BinaryOp,
        lhs: &'ast Expr,
        rhs: &'ast Expr,
    ) -> CompileResult<()> {
        self.compile_expr(lhs)?;
        let short = match op {
            BinaryOp::And => self.asm.emit_jump_if_false(),
            BinaryOp::Or => self.asm.emit_jump_if_true(),
            _ => return Err(CompileError::internal("not a logical operator")),
        };
        self.compile_expr(rhs)?;
        let end = self.asm.emit_jump();
        self.patch_here(short)?;
        self.asm.emit(match op {
            BinaryOp::And => Instruction::LoadFalse,
            _ => Instruction::LoadTrue,
        });
        self.patch_here(end)?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn intern_string(&mut self, s: &str) -> ConstIndex {
        ConstIndex::new(self.env.constants.add_string(s))
    }

    fn patch_here(&mut self, at: marten_bytecode::CodeOffset) -> CompileResult<()> {
        self.asm
            .patch_to_here(at)
            .map_err(|e| CompileError::internal(e.to_string()))
    }
}

fn binary_instruction(op: BinaryOp) -> CompileResult<Instruction> {
    Ok(match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Sub => Instruction::Sub,
        BinaryOp::Mul => Instruction::Mul,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Rem => Instruction::Rem,
        BinaryOp::Eq => Instruction::Eq,
        BinaryOp::Ne => Instruction::Ne,
        BinaryOp::Lt => Instruction::Lt,
        BinaryOp::Le => Instruction::Le,
        BinaryOp::Gt => Instruction::Gt,
        BinaryOp::Ge => Instruction::Ge,
        BinaryOp::And | BinaryOp::Or => {
            return Err(CompileError::internal(
                "logical operators have no direct instruction",
            ));
        }
    })
}
