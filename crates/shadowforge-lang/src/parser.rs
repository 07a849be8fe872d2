//! Recursive-descent parser producing the AST from a token stream.

use shadowforge_core::SourcePos;
use thiserror::Error;

use crate::ast::{AstNode, BinOp, CallArg, TypeRef, UnOp, VarDeclNode};
use crate::lexer::{Keyword, Token, TokenKind};

#[derive(Debug, Error)]
#[error("parse error at {pos}: got {got}, expected {expected}")]
pub struct ParseError {
    pub pos: SourcePos,
    pub got: String,
    pub expected: String,
}

/// Parse a full ST program (optionally wrapped in `PROGRAM … END_PROGRAM`)
/// into a single `Program` node.
pub fn parse(tokens: Vec<Token>) -> Result<AstNode, ParseError> {
    Parser { tokens, pos: 0 }.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn cur_kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn describe(kind: &TokenKind) -> String {
        format!("{kind:?}")
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError {
            pos: self.cur().pos,
            got: Self::describe(self.cur_kind()),
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.cur_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if matches!(self.cur_kind(), TokenKind::Keyword(k) if *k == kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, expected: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.cur_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        let mut name = None;
        if self.eat_keyword(Keyword::Program) {
            name = Some(self.ident()?);
        }

        let mut body = Vec::new();
        loop {
            if matches!(self.cur_kind(), TokenKind::Eof) {
                break;
            }
            if matches!(self.cur_kind(), TokenKind::Keyword(Keyword::EndProgram)) {
                self.advance();
                break;
            }
            if self.eat_keyword(Keyword::Var) {
                self.parse_var_block(&mut body)?;
                continue;
            }
            body.push(self.parse_statement()?);
        }
        Ok(AstNode::Program { name, body })
    }

    fn parse_var_block(&mut self, out: &mut Vec<AstNode>) -> Result<(), ParseError> {
        loop {
            if self.eat_keyword(Keyword::EndVar) {
                break;
            }
            let decl_name = self.ident()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let type_ref = self.parse_type_ref()?;
            let init = if matches!(self.cur_kind(), TokenKind::ColonEq) {
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&TokenKind::Semi, "';'")?;
            out.push(AstNode::VarDecl(VarDeclNode {
                name: decl_name,
                type_ref,
                init,
            }));
        }
        Ok(())
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        if self.eat_keyword(Keyword::Array) {
            self.expect(&TokenKind::LBracket, "'['")?;
            let lo = self.parse_int_literal()?;
            self.expect(&TokenKind::DotDot, "'..'")?;
            let hi = self.parse_int_literal()?;
            self.expect(&TokenKind::RBracket, "']'")?;
            self.expect_keyword(Keyword::Of, "OF")?;
            let base = self.parse_type_ref()?;
            return Ok(TypeRef::Array {
                lo,
                hi,
                base: Box::new(base),
            });
        }
        let name = match self.cur_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            TokenKind::Keyword(kw) => {
                self.advance();
                format!("{kw:?}")
            }
            _ => return Err(self.error("type name")),
        };
        Ok(TypeRef::Named(name))
    }

    fn parse_int_literal(&mut self) -> Result<i64, ParseError> {
        match self.cur_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n as i64)
            }
            TokenKind::Minus => {
                self.advance();
                let n = self.parse_int_literal()?;
                Ok(-n)
            }
            _ => Err(self.error("integer literal")),
        }
    }

    fn parse_statement(&mut self) -> Result<AstNode, ParseError> {
        match self.cur_kind().clone() {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Semi => {
                self.advance();
                Ok(AstNode::Nop)
            }
            TokenKind::Ident(_) => self.parse_assign_or_call(),
            _ => Err(self.error("statement")),
        }
    }

    fn parse_block_until(&mut self, terminators: &[Keyword]) -> Result<Vec<AstNode>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            if let TokenKind::Keyword(kw) = self.cur_kind() {
                if terminators.contains(kw) {
                    break;
                }
            }
            if matches!(self.cur_kind(), TokenKind::Eof) {
                return Err(self.error("end of block"));
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        self.expect_keyword(Keyword::If, "IF")?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect_keyword(Keyword::Then, "THEN")?;
        let body = self.parse_block_until(&[Keyword::Elsif, Keyword::Else, Keyword::EndIf])?;
        branches.push((cond, body));
        while self.eat_keyword(Keyword::Elsif) {
            let cond = self.parse_expr()?;
            self.expect_keyword(Keyword::Then, "THEN")?;
            let body = self.parse_block_until(&[Keyword::Elsif, Keyword::Else, Keyword::EndIf])?;
            branches.push((cond, body));
        }
        let else_branch = if self.eat_keyword(Keyword::Else) {
            self.parse_block_until(&[Keyword::EndIf])?
        } else {
            Vec::new()
        };
        self.expect_keyword(Keyword::EndIf, "END_IF")?;
        Ok(AstNode::If {
            branches,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<AstNode, ParseError> {
        self.expect_keyword(Keyword::While, "WHILE")?;
        let cond = self.parse_expr()?;
        self.expect_keyword(Keyword::Do, "DO")?;
        let body = self.parse_block_until(&[Keyword::EndWhile])?;
        self.expect_keyword(Keyword::EndWhile, "END_WHILE")?;
        Ok(AstNode::While {
            cond: Box::new(cond),
            body,
        })
    }

    fn parse_for(&mut self) -> Result<AstNode, ParseError> {
        self.expect_keyword(Keyword::For, "FOR")?;
        let var = self.ident()?;
        self.expect(&TokenKind::ColonEq, "':='")?;
        let start = self.parse_expr()?;
        self.expect_keyword(Keyword::To, "TO")?;
        let end = self.parse_expr()?;
        let step = if self.eat_keyword(Keyword::By) {
            self.parse_expr()?
        } else {
            AstNode::Number(1.0)
        };
        self.expect_keyword(Keyword::Do, "DO")?;
        let body = self.parse_block_until(&[Keyword::EndFor])?;
        self.expect_keyword(Keyword::EndFor, "END_FOR")?;
        Ok(AstNode::For {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step: Box::new(step),
            body,
        })
    }

    fn parse_assign_or_call(&mut self) -> Result<AstNode, ParseError> {
        let target = self.parse_postfix_primary()?;
        if matches!(self.cur_kind(), TokenKind::ColonEq) {
            self.advance();
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "';'")?;
            return Ok(AstNode::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        if matches!(self.cur_kind(), TokenKind::LParen) {
            if let AstNode::Var(name) = target {
                let args = self.parse_call_args()?;
                self.expect(&TokenKind::Semi, "';'")?;
                return Ok(AstNode::Call { name, args });
            }
        }
        Err(self.error("':=' or '('"))
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.cur_kind(), TokenKind::RParen) {
            loop {
                let arg = self.parse_call_arg()?;
                args.push(arg);
                if matches!(self.cur_kind(), TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_call_arg(&mut self) -> Result<CallArg, ParseError> {
        if let TokenKind::Ident(name) = self.cur_kind().clone() {
            let save = self.pos;
            self.advance();
            if matches!(self.cur_kind(), TokenKind::ColonEq) {
                self.advance();
                let value = self.parse_expr()?;
                return Ok(CallArg {
                    name: Some(name),
                    value,
                });
            }
            self.pos = save;
        }
        Ok(CallArg {
            name: None,
            value: self.parse_expr()?,
        })
    }

    // Expression precedence low -> high:
    // OR, AND, NOT, comparison, additive, multiplicative, unary, primary.
    fn parse_expr(&mut self) -> Result<AstNode, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<AstNode, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let rhs = self.parse_and()?;
            lhs = AstNode::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<AstNode, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let rhs = self.parse_not()?;
            lhs = AstNode::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<AstNode, ParseError> {
        if self.eat_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(AstNode::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<AstNode, ParseError> {
        let lhs = self.parse_additive()?;
        let op = match self.cur_kind() {
            TokenKind::Eq => BinOp::Eq,
            TokenKind::Ne | TokenKind::NeAlt => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(AstNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<AstNode, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = AstNode::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<AstNode, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cur_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                TokenKind::Keyword(Keyword::Mod) => BinOp::Mod,
                TokenKind::Keyword(Keyword::Div) => BinOp::IntDiv,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = AstNode::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<AstNode, ParseError> {
        if matches!(self.cur_kind(), TokenKind::Minus) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(AstNode::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
            });
        }
        if matches!(self.cur_kind(), TokenKind::Plus) {
            self.advance();
            return self.parse_unary();
        }
        self.parse_postfix_primary()
    }

    fn parse_postfix_primary(&mut self) -> Result<AstNode, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.cur_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.ident()?;
                    node = AstNode::MemberAccess {
                        base: Box::new(node),
                        member,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    node = AstNode::ArrayRef {
                        base: Box::new(node),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<AstNode, ParseError> {
        match self.cur_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(AstNode::Number(n))
            }
            TokenKind::TimeMs(ms) => {
                self.advance();
                Ok(AstNode::Number(ms as f64))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(AstNode::String(s))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(AstNode::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(AstNode::Bool(false))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if matches!(self.cur_kind(), TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    return Ok(AstNode::CallExpr { name, args });
                }
                Ok(AstNode::Var(name))
            }
            _ => Err(self.error("expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> AstNode {
        parse(tokenize(src).unwrap()).unwrap()
    }

    #[test]
    fn parses_var_block_and_assignment() {
        let ast = parse_src("VAR Start : BOOL := FALSE; END_VAR Start := TRUE;");
        match ast {
            AstNode::Program { body, .. } => {
                assert_eq!(body.len(), 2);
                assert!(matches!(body[0], AstNode::VarDecl(_)));
                assert!(matches!(body[1], AstNode::Assign { .. }));
            }
            _ => panic!("expected Program"),
        }
    }

    #[test]
    fn parses_timer_call_with_keyword_args() {
        let ast = parse_src("T1(IN := Start, PT := T#100ms);");
        match ast {
            AstNode::Program { body, .. } => match &body[0] {
                AstNode::Call { name, args } => {
                    assert_eq!(name, "T1");
                    assert_eq!(args.len(), 2);
                    assert_eq!(args[0].name.as_deref(), Some("IN"));
                }
                other => panic!("unexpected node {other:?}"),
            },
            _ => panic!("expected Program"),
        }
    }

    #[test]
    fn parses_if_elsif_else() {
        let ast = parse_src(
            "IF A > 1 THEN B := 1; ELSIF A > 0 THEN B := 2; ELSE B := 3; END_IF",
        );
        match ast {
            AstNode::Program { body, .. } => match &body[0] {
                AstNode::If {
                    branches,
                    else_branch,
                } => {
                    assert_eq!(branches.len(), 2);
                    assert_eq!(else_branch.len(), 1);
                }
                other => panic!("unexpected node {other:?}"),
            },
            _ => panic!("expected Program"),
        }
    }

    #[test]
    fn parses_array_decl_and_ref() {
        let ast = parse_src("VAR A : ARRAY[0..9] OF INT; END_VAR A[1] := 5;");
        match ast {
            AstNode::Program { body, .. } => {
                assert!(matches!(
                    &body[0],
                    AstNode::VarDecl(VarDeclNode {
                        type_ref: TypeRef::Array { lo: 0, hi: 9, .. },
                        ..
                    })
                ));
                assert!(matches!(&body[1], AstNode::Assign { .. }));
            }
            _ => panic!("expected Program"),
        }
    }

    #[test]
    fn rejects_missing_end_if() {
        let err = parse(tokenize("IF A THEN B := 1;").unwrap()).unwrap_err();
        assert_eq!(err.expected, "end of block");
    }
}
