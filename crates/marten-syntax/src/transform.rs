//! AST transformation passes
//!
//! A [`Transformer`] rewrites nodes bottom-up; the default methods walk the
//! tree unchanged. [`ConstFold`] folds operations on literal operands at
//! compile time, eliminating runtime computation for expressions like
//! `2 + 3`, `-1`, or `!true`.

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};

/// Maximum string length for compile-time concatenation
const MAX_STRING_CONCAT_LEN: usize = 1024;

/// A bottom-up AST rewrite. Override [`transform_expr`](Self::transform_expr)
/// or [`transform_stmt`](Self::transform_stmt); call the `walk_*` helpers to
/// recurse into children.
pub trait Transformer {
    /// Rewrite an expression. The default walks children and leaves the
    /// node unchanged.
    fn transform_expr(&mut self, expr: Expr) -> Expr {
        walk_expr(self, expr)
    }

    /// Rewrite a statement. The default walks children and leaves the
    /// node unchanged.
    fn transform_stmt(&mut self, stmt: Stmt) -> Stmt {
        walk_stmt(self, stmt)
    }
}

/// Recurse into an expression's children, transforming each
pub fn walk_expr<T: Transformer + ?Sized>(t: &mut T, expr: Expr) -> Expr {
    let kind = match expr.kind {
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op,
            operand: Box::new(t.transform_expr(*operand)),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op,
            lhs: Box::new(t.transform_expr(*lhs)),
            rhs: Box::new(t.transform_expr(*rhs)),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(t.transform_expr(*callee)),
            args: args.into_iter().map(|a| t.transform_expr(a)).collect(),
        },
        leaf => leaf,
    };
    Expr::new(kind, expr.region)
}

/// Recurse into a statement's children, transforming each
pub fn walk_stmt<T: Transformer + ?Sized>(t: &mut T, stmt: Stmt) -> Stmt {
    let kind = match stmt.kind {
        StmtKind::Let { name, value } => StmtKind::Let {
            name,
            value: t.transform_expr(value),
        },
        StmtKind::Assign { name, value } => StmtKind::Assign {
            name,
            value: t.transform_expr(value),
        },
        StmtKind::Expr(expr) => StmtKind::Expr(t.transform_expr(expr)),
        StmtKind::Block(body) => StmtKind::Block(walk_block(t, body)),
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => StmtKind::If {
            cond: t.transform_expr(cond),
            then_body: walk_block(t, then_body),
            else_body: else_body.map(|b| walk_block(t, b)),
        },
        StmtKind::While { cond, body } => StmtKind::While {
            cond: t.transform_expr(cond),
            body: walk_block(t, body),
        },
        StmtKind::Return(value) => StmtKind::Return(value.map(|v| t.transform_expr(v))),
        StmtKind::Throw(value) => StmtKind::Throw(t.transform_expr(value)),
        StmtKind::Try {
            body,
            catch,
            finally,
        } => StmtKind::Try {
            body: walk_block(t, body),
            catch: catch.map(|mut c| {
                c.body = walk_block(t, c.body);
                c
            }),
            finally: finally.map(|b| walk_block(t, b)),
        },
        leaf @ (StmtKind::Break | StmtKind::Continue) => leaf,
    };
    Stmt::new(kind, stmt.region)
}

fn walk_block<T: Transformer + ?Sized>(t: &mut T, body: Vec<Stmt>) -> Vec<Stmt> {
    body.into_iter().map(|s| t.transform_stmt(s)).collect()
}

/// Apply a transformer to every statement in a program, declarations included
pub fn transform_program<T: Transformer + ?Sized>(t: &mut T, mut program: Program) -> Program {
    for decl in &mut program.decls {
        match decl {
            crate::ast::Decl::Fn(f) => {
                f.body = walk_block(t, std::mem::take(&mut f.body));
            }
            crate::ast::Decl::Class(c) => {
                for m in &mut c.methods {
                    m.body = walk_block(t, std::mem::take(&mut m.body));
                }
            }
        }
    }
    program.body = walk_block(t, program.body);
    program
}

/// Compile-time constant folding.
///
/// Operations that would fault at runtime (integer overflow, division by
/// zero) are left unfolded so the fault still happens where the source
/// says it does.
#[derive(Debug, Default)]
pub struct ConstFold;

impl Transformer for ConstFold {
    fn transform_expr(&mut self, expr: Expr) -> Expr {
        let expr = walk_expr(self, expr);
        let region = expr.region;
        match &expr.kind {
            ExprKind::Unary { op, operand } => {
                if let Some(kind) = fold_unary(*op, &operand.kind) {
                    return Expr::new(kind, region);
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    if let Some(folded) = fold_logical(*op, lhs, rhs) {
                        return folded;
                    }
                } else if let Some(kind) = fold_binary(*op, &lhs.kind, &rhs.kind) {
                    return Expr::new(kind, region);
                }
            }
            _ => {}
        }
        expr
    }
}

/// Fold constants throughout a program
pub fn fold_constants(program: Program) -> Program {
    transform_program(&mut ConstFold, program)
}

fn literal_truthiness(kind: &ExprKind) -> Option<bool> {
    match kind {
        ExprKind::Null | ExprKind::Bool(false) => Some(false),
        ExprKind::Bool(true)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_) => Some(true),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, operand: &ExprKind) -> Option<ExprKind> {
    match op {
        UnaryOp::Neg => match operand {
            // i64::MIN has no negation; leave it for the runtime fault
            ExprKind::Int(n) => n.checked_neg().map(ExprKind::Int),
            ExprKind::Float(n) => Some(ExprKind::Float(-n)),
            _ => None,
        },
        UnaryOp::Not => literal_truthiness(operand).map(|t| ExprKind::Bool(!t)),
    }
}

fn fold_binary(op: BinaryOp, lhs: &ExprKind, rhs: &ExprKind) -> Option<ExprKind> {
    match op {
        BinaryOp::Add => fold_addition(lhs, rhs),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            fold_arithmetic(op, lhs, rhs)
        }
        BinaryOp::Eq => fold_equality(lhs, rhs).map(ExprKind::Bool),
        BinaryOp::Ne => fold_equality(lhs, rhs).map(|eq| ExprKind::Bool(!eq)),
        BinaryOp::Lt => fold_relational(lhs, rhs, |o| o.is_lt()),
        BinaryOp::Le => fold_relational(lhs, rhs, |o| o.is_le()),
        BinaryOp::Gt => fold_relational(lhs, rhs, |o| o.is_gt()),
        BinaryOp::Ge => fold_relational(lhs, rhs, |o| o.is_ge()),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

/// Addition: string concatenation when both sides are strings, numeric
/// addition otherwise
fn fold_addition(lhs: &ExprKind, rhs: &ExprKind) -> Option<ExprKind> {
    if let (ExprKind::Str(l), ExprKind::Str(r)) = (lhs, rhs) {
        if l.len() + r.len() > MAX_STRING_CONCAT_LEN {
            return None;
        }
        let mut out = l.clone();
        out.push_str(r);
        return Some(ExprKind::Str(out));
    }
    fold_arithmetic(BinaryOp::Add, lhs, rhs)
}

fn fold_arithmetic(op: BinaryOp, lhs: &ExprKind, rhs: &ExprKind) -> Option<ExprKind> {
    match (lhs, rhs) {
        (ExprKind::Int(l), ExprKind::Int(r)) => {
            let folded = match op {
                BinaryOp::Add => l.checked_add(*r),
                BinaryOp::Sub => l.checked_sub(*r),
                BinaryOp::Mul => l.checked_mul(*r),
                BinaryOp::Div => l.checked_div(*r),
                BinaryOp::Rem => l.checked_rem(*r),
                _ => None,
            };
            // Overflow and division by zero fault at runtime; don't fold them
            folded.map(ExprKind::Int)
        }
        (lhs, rhs) => {
            let l = as_float(lhs)?;
            let r = as_float(rhs)?;
            let folded = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Rem => l % r,
                _ => return None,
            };
            Some(ExprKind::Float(folded))
        }
    }
}

/// Numeric operand as f64, promoting integers
fn as_float(kind: &ExprKind) -> Option<f64> {
    match kind {
        ExprKind::Int(n) => Some(*n as f64),
        ExprKind::Float(n) => Some(*n),
        _ => None,
    }
}

fn fold_equality(lhs: &ExprKind, rhs: &ExprKind) -> Option<bool> {
    match (lhs, rhs) {
        (ExprKind::Null, ExprKind::Null) => Some(true),
        (ExprKind::Bool(l), ExprKind::Bool(r)) => Some(l == r),
        (ExprKind::Int(l), ExprKind::Int(r)) => Some(l == r),
        (ExprKind::Str(l), ExprKind::Str(r)) => Some(l == r),
        (ExprKind::Float(_), _) | (_, ExprKind::Float(_)) => {
            let (l, r) = (as_float(lhs)?, as_float(rhs)?);
            Some(l == r)
        }
        (
            ExprKind::Null | ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Str(_),
            ExprKind::Null | ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Str(_),
        ) => Some(false),
        _ => None,
    }
}

fn fold_relational(
    lhs: &ExprKind,
    rhs: &ExprKind,
    pick: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<ExprKind> {
    let ord = match (lhs, rhs) {
        (ExprKind::Int(l), ExprKind::Int(r)) => l.cmp(r),
        (ExprKind::Str(l), ExprKind::Str(r)) => l.cmp(r),
        (lhs, rhs) => {
            let (l, r) = (as_float(lhs)?, as_float(rhs)?);
            l.partial_cmp(&r)?
        }
    };
    Some(ExprKind::Bool(pick(ord)))
}

/// Short-circuit operators fold only on a literal left operand:
/// `&&` yields `false` when the left is falsy and the right operand
/// otherwise; `||` is the mirror image.
fn fold_logical(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let lhs_truthy = literal_truthiness(&lhs.kind)?;
    let folded = match (op, lhs_truthy) {
        (BinaryOp::And, false) => Expr::new(ExprKind::Bool(false), lhs.region),
        (BinaryOp::Or, true) => Expr::new(ExprKind::Bool(true), lhs.region),
        _ => rhs.clone(),
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::region::SourceId;

    fn fold_expr(source: &str) -> ExprKind {
        let program = parse(&format!("let x = {};", source), SourceId(0)).unwrap();
        let program = fold_constants(program);
        let StmtKind::Let { value, .. } = &program.body[0].kind else {
            panic!("expected let");
        };
        value.kind.clone()
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(fold_expr("2 + 3 * 4"), ExprKind::Int(14));
        assert_eq!(fold_expr("-(2 + 3)"), ExprKind::Int(-5));
        assert_eq!(fold_expr("1.5 * 2"), ExprKind::Float(3.0));
    }

    #[test]
    fn test_faulting_ops_do_not_fold() {
        assert!(matches!(fold_expr("1 / 0"), ExprKind::Binary { .. }));
        assert!(matches!(
            fold_expr("9223372036854775807 + 1"),
            ExprKind::Binary { .. }
        ));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            fold_expr(r#""foo" + "bar""#),
            ExprKind::Str("foobar".into())
        );
        // Mixed string/number addition is a runtime concern
        assert!(matches!(
            fold_expr(r#""x=" + 1"#),
            ExprKind::Binary { .. }
        ));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(fold_expr("1 < 2"), ExprKind::Bool(true));
        assert_eq!(fold_expr("1 == 1.0"), ExprKind::Bool(true));
        assert_eq!(fold_expr("\"a\" == 1"), ExprKind::Bool(false));
        assert_eq!(fold_expr("!true"), ExprKind::Bool(false));
    }

    #[test]
    fn test_short_circuit_folds_on_literal_lhs() {
        assert_eq!(fold_expr("false && f()"), ExprKind::Bool(false));
        assert_eq!(fold_expr("true || f()"), ExprKind::Bool(true));
        assert!(matches!(fold_expr("true && f()"), ExprKind::Call { .. }));
        assert!(matches!(fold_expr("f() && true"), ExprKind::Binary { .. }));
    }

    #[test]
    fn test_names_are_left_alone() {
        assert!(matches!(fold_expr("a + 1"), ExprKind::Binary { .. }));
    }

    #[test]
    fn test_folds_inside_declarations() {
        let program = parse("fn f() { return 1 + 2; }", SourceId(0)).unwrap();
        let program = fold_constants(program);
        let crate::ast::Decl::Fn(f) = &program.decls[0] else {
            panic!("expected fn");
        };
        let StmtKind::Return(Some(value)) = &f.body[0].kind else {
            panic!("expected return");
        };
        assert_eq!(value.kind, ExprKind::Int(3));
    }
}
