//! Recursive-descent parser

use crate::ast::{
    BinaryOp, CatchClause, ClassDecl, Decl, Expr, ExprKind, FnDecl, Program, Stmt, StmtKind,
    UnaryOp,
};
use crate::error::{SyntaxError, SyntaxResult};
use crate::lexer::tokenize;
use crate::region::SourceId;
use crate::token::{Token, TokenKind};

/// Parse a source unit into a [`Program`]
pub fn parse(source: &str, source_id: SourceId) -> SyntaxResult<Program> {
    let tokens = tokenize(source, source_id)?;
    Parser::new(tokens).run()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn run(mut self) -> SyntaxResult<Program> {
        let mut program = Program::default();
        while !self.check(&TokenKind::Eof) {
            match self.peek().kind {
                TokenKind::Fn => program.decls.push(Decl::Fn(self.fn_decl()?)),
                TokenKind::Class => program.decls.push(Decl::Class(self.class_decl()?)),
                _ => program.body.push(self.statement()?),
            }
        }
        Ok(program)
    }

    // ==================== Declarations ====================

    fn fn_decl(&mut self) -> SyntaxResult<FnDecl> {
        let start = self.expect(TokenKind::Fn)?.region;
        let name = self.expect_name()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_name()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let header_end = self.expect(TokenKind::RParen)?.region;

        let body = self.block()?;
        Ok(FnDecl {
            name,
            params,
            body,
            region: start.merge(header_end),
        })
    }

    fn class_decl(&mut self) -> SyntaxResult<ClassDecl> {
        let start = self.expect(TokenKind::Class)?.region;
        let name = self.expect_name()?;
        let header_end = self.expect(TokenKind::LBrace)?.region;

        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            methods.push(self.fn_decl()?);
        }
        self.expect(TokenKind::RBrace)?;

        Ok(ClassDecl {
            name,
            methods,
            region: start.merge(header_end),
        })
    }

    // ==================== Statements ====================

    fn statement(&mut self) -> SyntaxResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => self.let_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Throw => self.throw_stmt(),
            TokenKind::Break => {
                let region = self.advance().region;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(StmtKind::Break, region))
            }
            TokenKind::Continue => {
                let region = self.advance().region;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(StmtKind::Continue, region))
            }
            TokenKind::LBrace => {
                let start = self.peek().region;
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::Block(body), start))
            }
            _ => self.expr_or_assign_stmt(),
        }
    }

    fn let_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::Let)?.region;
        let name = self.expect_name()?;
        self.expect(TokenKind::Assign)?;
        let value = self.expression()?;
        let end = self.expect(TokenKind::Semi)?.region;
        Ok(Stmt::new(
            StmtKind::Let { name, value },
            start.merge(end),
        ))
    }

    fn if_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::If)?.region;
        let cond = self.expression()?;
        let then_body = self.block()?;
        let else_body = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // `else if` chains as a single-statement else block
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            start,
        ))
    }

    fn while_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::While)?.region;
        let cond = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::new(StmtKind::While { cond, body }, start))
    }

    fn try_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::Try)?.region;
        let body = self.block()?;

        let catch = if self.check(&TokenKind::Catch) {
            let clause_start = self.advance().region;
            self.expect(TokenKind::LParen)?;
            let name = self.expect_name()?;
            let clause_end = self.expect(TokenKind::RParen)?.region;
            let body = self.block()?;
            Some(CatchClause {
                name,
                body,
                region: clause_start.merge(clause_end),
            })
        } else {
            None
        };

        let finally = if self.eat(&TokenKind::Finally) {
            Some(self.block()?)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(SyntaxError::new(
                "try statement requires a catch or finally clause",
                start,
            ));
        }

        Ok(Stmt::new(
            StmtKind::Try {
                body,
                catch,
                finally,
            },
            start,
        ))
    }

    fn return_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::Return)?.region;
        let value = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.expression()?)
        };
        let end = self.expect(TokenKind::Semi)?.region;
        Ok(Stmt::new(StmtKind::Return(value), start.merge(end)))
    }

    fn throw_stmt(&mut self) -> SyntaxResult<Stmt> {
        let start = self.expect(TokenKind::Throw)?.region;
        let value = self.expression()?;
        let end = self.expect(TokenKind::Semi)?.region;
        Ok(Stmt::new(StmtKind::Throw(value), start.merge(end)))
    }

    fn expr_or_assign_stmt(&mut self) -> SyntaxResult<Stmt> {
        // `name = expr;` needs one token of lookahead past the name
        if let TokenKind::Name(_) = self.peek().kind
            && self.peek_ahead(1).kind == TokenKind::Assign
        {
            let name_token = self.advance();
            let TokenKind::Name(name) = name_token.kind else {
                unreachable!()
            };
            self.advance(); // `=`
            let value = self.expression()?;
            let end = self.expect(TokenKind::Semi)?.region;
            return Ok(Stmt::new(
                StmtKind::Assign { name, value },
                name_token.region.merge(end),
            ));
        }

        let expr = self.expression()?;
        let region = expr.region;
        let end = self.expect(TokenKind::Semi)?.region;
        Ok(Stmt::new(StmtKind::Expr(expr), region.merge(end)))
    }

    fn block(&mut self) -> SyntaxResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    // ==================== Expressions ====================

    fn expression(&mut self) -> SyntaxResult<Expr> {
        self.binary_expr(0)
    }

    fn binary_expr(&mut self, min_prec: u8) -> SyntaxResult<Expr> {
        let mut lhs = self.unary_expr()?;

        while let Some((op, prec)) = binary_op(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.binary_expr(prec + 1)?;
            let region = lhs.region.merge(rhs.region);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                region,
            );
        }

        Ok(lhs)
    }

    fn unary_expr(&mut self) -> SyntaxResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance().region;
            let operand = self.unary_expr()?;
            let region = start.merge(operand.region);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                region,
            ));
        }
        self.call_expr()
    }

    fn call_expr(&mut self) -> SyntaxResult<Expr> {
        let mut expr = self.primary_expr()?;

        loop {
            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = self.expect(TokenKind::RParen)?.region;
                let region = expr.region.merge(end);
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    region,
                );
            } else if self.check(&TokenKind::Dot) {
                let ExprKind::Name(class) = &expr.kind else {
                    return Err(SyntaxError::new(
                        "member access is only valid on a class name",
                        self.peek().region,
                    ));
                };
                let class = class.clone();
                self.advance(); // `.`
                let member = self.expect_name()?;
                let end = self.tokens[self.pos - 1].region;
                let region = expr.region.merge(end);
                expr = Expr::new(ExprKind::Member { class, member }, region);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary_expr(&mut self) -> SyntaxResult<Expr> {
        let token = self.advance();
        let region = token.region;
        let kind = match token.kind {
            TokenKind::Null => ExprKind::Null,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(n) => ExprKind::Float(n),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::Name(n) => ExprKind::Name(n),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            other => {
                return Err(SyntaxError::new(
                    format!("expected expression, found {}", other.describe()),
                    region,
                ));
            }
        };
        Ok(Expr::new(kind, region))
    }

    // ==================== Token helpers ====================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> SyntaxResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let found = self.peek();
            Err(SyntaxError::new(
                format!(
                    "expected {}, found {}",
                    kind.describe(),
                    found.kind.describe()
                ),
                found.region,
            ))
        }
    }

    fn expect_name(&mut self) -> SyntaxResult<String> {
        match &self.peek().kind {
            TokenKind::Name(_) => {
                let token = self.advance();
                let TokenKind::Name(name) = token.kind else {
                    unreachable!()
                };
                Ok(name)
            }
            other => Err(SyntaxError::new(
                format!("expected identifier, found {}", other.describe()),
                self.peek().region,
            )),
        }
    }
}

/// Binary operator and its precedence (higher binds tighter)
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    Some(match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::BangEq => (BinaryOp::Ne, 3),
        TokenKind::Lt => (BinaryOp::Lt, 4),
        TokenKind::Le => (BinaryOp::Le, 4),
        TokenKind::Gt => (BinaryOp::Gt, 4),
        TokenKind::Ge => (BinaryOp::Ge, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source, SourceId(0)).unwrap()
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("let x = 1 + 2 * 3;");
        let StmtKind::Let { value, .. } = &program.body[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_try_catch_finally() {
        let program = parse_ok("try { } catch (e) { } finally { }");
        let StmtKind::Try {
            catch, finally, ..
        } = &program.body[0].kind
        else {
            panic!("expected try");
        };
        assert_eq!(catch.as_ref().unwrap().name, "e");
        assert!(finally.is_some());
    }

    #[test]
    fn test_try_requires_clause() {
        let err = parse("try { }", SourceId(0)).unwrap_err();
        assert!(err.message.contains("catch or finally"));
    }

    #[test]
    fn test_fn_and_class_decls() {
        let program = parse_ok("fn add(a, b) { return a + b; } class Math { fn zero() { return 0; } }");
        assert_eq!(program.decls.len(), 2);
        let Decl::Class(class) = &program.decls[1] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "Math");
        assert_eq!(class.methods[0].name, "zero");
    }

    #[test]
    fn test_member_call() {
        let program = parse_ok("Math.zero();");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { callee, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
    }

    #[test]
    fn test_assignment_statement() {
        let program = parse_ok("x = 1;");
        assert!(matches!(program.body[0].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn test_else_if_chain() {
        let program = parse_ok("if a { } else if b { } else { }");
        let StmtKind::If { else_body, .. } = &program.body[0].kind else {
            panic!("expected if");
        };
        let nested = &else_body.as_ref().unwrap()[0];
        assert!(matches!(nested.kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_missing_semi_is_error() {
        let err = parse("let x = 1", SourceId(0)).unwrap_err();
        assert!(err.message.contains("expected `;`"));
    }
}
