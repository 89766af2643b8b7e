//! Abstract syntax tree
//!
//! Expressions and statements are sum types; every node carries its source
//! region. Statements expose two derived control-flow facts consumed by
//! block codegen: whether the statement unconditionally returns (or raises),
//! and whether it unconditionally breaks/continues out of its block.

use crate::region::Region;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-`
    Neg,
    /// Boolean negation `!`
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` (short-circuit)
    And,
    /// `||` (short-circuit)
    Or,
}

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Expression variant
    pub kind: ExprKind,
    /// Source region
    pub region: Region,
}

/// Expression variants
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `null`
    Null,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Name reference
    Name(String),
    /// Qualified class-member reference `Class.method`
    Member {
        /// Class name
        class: String,
        /// Member name
        member: String,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Call expression
    Call {
        /// Callee expression
        callee: Box<Expr>,
        /// Argument expressions
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Create an expression node
    pub fn new(kind: ExprKind, region: Region) -> Self {
        Self { kind, region }
    }
}

/// A statement node
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Statement variant
    pub kind: StmtKind,
    /// Source region
    pub region: Region,
}

/// Statement variants
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name = expr;`
    Let {
        /// Declared name
        name: String,
        /// Initializer
        value: Expr,
    },
    /// `name = expr;`
    Assign {
        /// Target name
        name: String,
        /// Assigned value
        value: Expr,
    },
    /// Expression statement (value discarded)
    Expr(Expr),
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `if cond { } else { }`
    If {
        /// Condition
        cond: Expr,
        /// Then branch
        then_body: Vec<Stmt>,
        /// Optional else branch
        else_body: Option<Vec<Stmt>>,
    },
    /// `while cond { }`
    While {
        /// Condition
        cond: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// `return expr?;`
    Return(Option<Expr>),
    /// `throw expr;`
    Throw(Expr),
    /// `try { } catch (name) { } finally { }`
    Try {
        /// Protected body
        body: Vec<Stmt>,
        /// Optional catch clause
        catch: Option<CatchClause>,
        /// Optional finally body
        finally: Option<Vec<Stmt>>,
    },
}

/// A catch clause
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Name bound to the caught exception
    pub name: String,
    /// Handler body
    pub body: Vec<Stmt>,
    /// Source region of the clause header
    pub region: Region,
}

impl Stmt {
    /// Create a statement node
    pub fn new(kind: StmtKind, region: Region) -> Self {
        Self { kind, region }
    }

    /// Whether this statement unconditionally exits its function, either by
    /// returning or by raising. Statements after it in a block are dead.
    pub fn is_control_flow_returned(&self) -> bool {
        match &self.kind {
            StmtKind::Return(_) | StmtKind::Throw(_) => true,
            StmtKind::Block(body) => block_flow(body) == BlockFlow::Returns,
            StmtKind::If {
                then_body,
                else_body: Some(else_body),
                ..
            } => block_flow(then_body) == BlockFlow::Returns
                && block_flow(else_body) == BlockFlow::Returns,
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                if let Some(fin) = finally
                    && block_flow(fin) == BlockFlow::Returns
                {
                    return true;
                }
                block_flow(body) == BlockFlow::Returns
                    && catch
                        .as_ref()
                        .is_none_or(|c| block_flow(&c.body) == BlockFlow::Returns)
            }
            _ => false,
        }
    }

    /// Whether this statement unconditionally transfers control out of its
    /// enclosing block via `break` or `continue`.
    pub fn is_control_flow_interrupted(&self) -> bool {
        match &self.kind {
            StmtKind::Break | StmtKind::Continue => true,
            StmtKind::Block(body) => block_flow(body) == BlockFlow::Interrupts,
            StmtKind::If {
                then_body,
                else_body: Some(else_body),
                ..
            } => {
                let (t, e) = (block_flow(then_body), block_flow(else_body));
                t != BlockFlow::FallsThrough
                    && e != BlockFlow::FallsThrough
                    && (t == BlockFlow::Interrupts || e == BlockFlow::Interrupts)
            }
            _ => false,
        }
    }
}

/// How control leaves a statement list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFlow {
    /// Execution can reach the end of the list
    FallsThrough,
    /// The list unconditionally returns or raises
    Returns,
    /// The list unconditionally breaks/continues
    Interrupts,
}

/// Compute how control leaves a statement list, scanning until the first
/// statement that cannot fall through
pub fn block_flow(stmts: &[Stmt]) -> BlockFlow {
    for stmt in stmts {
        if stmt.is_control_flow_returned() {
            return BlockFlow::Returns;
        }
        if stmt.is_control_flow_interrupted() {
            return BlockFlow::Interrupts;
        }
    }
    BlockFlow::FallsThrough
}

/// A function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    /// Function name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Function body
    pub body: Vec<Stmt>,
    /// Source region of the header
    pub region: Region,
}

/// A class declaration: a named group of methods
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    /// Class name
    pub name: String,
    /// Method declarations
    pub methods: Vec<FnDecl>,
    /// Source region of the header
    pub region: Region,
}

/// A top-level declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `fn name(...) { }`
    Fn(FnDecl),
    /// `class Name { ... }`
    Class(ClassDecl),
}

/// A parsed source unit: declarations plus top-level script statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Function and class declarations
    pub decls: Vec<Decl>,
    /// Script body statements
    pub body: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Region, SourceId};

    fn r() -> Region {
        Region::point(SourceId(0), 1, 1)
    }

    fn ret() -> Stmt {
        Stmt::new(StmtKind::Return(None), r())
    }

    fn brk() -> Stmt {
        Stmt::new(StmtKind::Break, r())
    }

    fn expr_stmt() -> Stmt {
        Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Null, r())), r())
    }

    #[test]
    fn test_return_and_throw_are_returned() {
        assert!(ret().is_control_flow_returned());
        let throw = Stmt::new(
            StmtKind::Throw(Expr::new(ExprKind::Int(1), r())),
            r(),
        );
        assert!(throw.is_control_flow_returned());
        assert!(!expr_stmt().is_control_flow_returned());
    }

    #[test]
    fn test_if_requires_both_branches() {
        let both = Stmt::new(
            StmtKind::If {
                cond: Expr::new(ExprKind::Bool(true), r()),
                then_body: vec![ret()],
                else_body: Some(vec![ret()]),
            },
            r(),
        );
        assert!(both.is_control_flow_returned());

        let one = Stmt::new(
            StmtKind::If {
                cond: Expr::new(ExprKind::Bool(true), r()),
                then_body: vec![ret()],
                else_body: None,
            },
            r(),
        );
        assert!(!one.is_control_flow_returned());
    }

    #[test]
    fn test_block_flow_stops_at_first_exit() {
        assert_eq!(
            block_flow(&[expr_stmt(), brk(), ret()]),
            BlockFlow::Interrupts
        );
        assert_eq!(block_flow(&[expr_stmt()]), BlockFlow::FallsThrough);
    }

    #[test]
    fn test_try_returns_when_all_paths_return() {
        let try_stmt = Stmt::new(
            StmtKind::Try {
                body: vec![ret()],
                catch: Some(CatchClause {
                    name: "e".into(),
                    body: vec![ret()],
                    region: r(),
                }),
                finally: None,
            },
            r(),
        );
        assert!(try_stmt.is_control_flow_returned());

        let catch_falls_through = Stmt::new(
            StmtKind::Try {
                body: vec![ret()],
                catch: Some(CatchClause {
                    name: "e".into(),
                    body: vec![expr_stmt()],
                    region: r(),
                }),
                finally: None,
            },
            r(),
        );
        assert!(!catch_falls_through.is_control_flow_returned());
    }
}
