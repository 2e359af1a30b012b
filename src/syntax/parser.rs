//! Recursive-descent parser with automatic semicolon insertion.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};
use crate::errors::{RigError, SourceContext};
use crate::Span;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "const", "continue", "default", "delete", "do", "else", "false",
    "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null", "return",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
];

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses standard-mode source. `scripting` only changes comment handling.
#[tracing::instrument(skip_all, fields(name = %source.name))]
pub fn parse(source: &SourceContext, scripting: bool) -> Result<Program, RigError> {
    let tokens = tokenize(source, scripting)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        allow_in: true,
    };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser<'a> {
    source: &'a SourceContext,
    tokens: Vec<Token>,
    pos: usize,
    /// False while parsing a `for` head, where `in` ends the init.
    allow_in: bool,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------------
    // TOKEN HELPERS
    // ------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Word(q) if q == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        let hit = self.is_punct(p);
        if hit {
            self.advance();
        }
        hit
    }

    fn eat_word(&mut self, w: &str) -> bool {
        let hit = self.is_word(w);
        if hit {
            self.advance();
        }
        hit
    }

    fn expect_punct(&mut self, p: &str) -> Result<Span, RigError> {
        if self.is_punct(p) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("'{p}'")))
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<Span, RigError> {
        if self.is_word(w) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("'{w}'")))
        }
    }

    fn identifier(&mut self) -> Result<(String, Span), RigError> {
        match &self.peek().kind {
            TokenKind::Word(w) if !RESERVED.contains(&w.as_str()) => {
                let name = w.clone();
                Ok((name, self.advance().span))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn unexpected(&self, wanted: &str) -> RigError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Word(w) => format!("'{w}'"),
            TokenKind::Punct(p) => format!("'{p}'"),
            TokenKind::Eof => "end of input".to_string(),
        };
        self.source
            .syntax_error(format!("expected {wanted}, found {found}"), token.span)
    }

    fn last_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].span.end
    }

    /// `;`, or an inserted one before `}`, end of input or a line break.
    fn semicolon(&mut self) -> Result<(), RigError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().newline_before
        {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    // ------------------------------------------------------------------------
    // STATEMENTS
    // ------------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, RigError> {
        let token = self.peek().clone();
        let start = token.span.start;
        let kind = match &token.kind {
            TokenKind::Punct("{") => StmtKind::Block(self.block()?),
            TokenKind::Punct(";") => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Word(w) => match w.as_str() {
                "var" | "let" | "const" => {
                    self.advance();
                    let decls = self.declarators()?;
                    self.semicolon()?;
                    StmtKind::Var(decls)
                }
                "function" => {
                    self.advance();
                    let def = self.function_rest(start, true)?;
                    StmtKind::Function(def)
                }
                "if" => self.if_statement()?,
                "while" => {
                    self.advance();
                    let test = self.paren_expression()?;
                    let body = Box::new(self.statement()?);
                    StmtKind::While { test, body }
                }
                "do" => {
                    self.advance();
                    let body = Box::new(self.statement()?);
                    self.expect_word("while")?;
                    let test = self.paren_expression()?;
                    self.eat_punct(";");
                    StmtKind::DoWhile { body, test }
                }
                "for" => self.for_statement()?,
                "return" => {
                    self.advance();
                    let value = if self.is_punct(";")
                        || self.is_punct("}")
                        || self.at_eof()
                        || self.peek().newline_before
                    {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.semicolon()?;
                    StmtKind::Return(value)
                }
                "break" => {
                    self.advance();
                    self.semicolon()?;
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    self.semicolon()?;
                    StmtKind::Continue
                }
                "throw" => {
                    self.advance();
                    if self.peek().newline_before {
                        return Err(self.unexpected("an expression on the same line as 'throw'"));
                    }
                    let value = self.expression()?;
                    self.semicolon()?;
                    StmtKind::Throw(value)
                }
                "try" => self.try_statement()?,
                _ => self.expression_statement()?,
            },
            _ => self.expression_statement()?,
        };
        Ok(Stmt {
            kind,
            span: Span::new(start, self.last_end()),
        })
    }

    fn expression_statement(&mut self) -> Result<StmtKind, RigError> {
        let expr = self.expression()?;
        self.semicolon()?;
        Ok(StmtKind::Expr(expr))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, RigError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn declarators(&mut self) -> Result<Vec<Declarator>, RigError> {
        let mut decls = Vec::new();
        loop {
            let (name, span) = self.identifier()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push(Declarator {
                name,
                init,
                span: Span::new(span.start, self.last_end()),
            });
            if !self.eat_punct(",") {
                return Ok(decls);
            }
        }
    }

    fn paren_expression(&mut self) -> Result<Expr, RigError> {
        self.expect_punct("(")?;
        let expr = self.expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> Result<StmtKind, RigError> {
        self.advance();
        let test = self.paren_expression()?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_word("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> Result<StmtKind, RigError> {
        self.advance();
        self.expect_punct("(")?;
        let init_start = self.peek().span.start;

        let init = if self.is_punct(";") {
            None
        } else if self.is_word("var") || self.is_word("let") || self.is_word("const") {
            self.advance();
            if matches!(self.peek_kind_at(1), TokenKind::Word(w) if w == "in") {
                let (name, _) = self.identifier()?;
                self.advance();
                return self.for_in_rest(true, name);
            }
            self.allow_in = false;
            let decls = self.declarators();
            self.allow_in = true;
            Some(Box::new(Stmt {
                kind: StmtKind::Var(decls?),
                span: Span::new(init_start, self.last_end()),
            }))
        } else {
            self.allow_in = false;
            let expr = self.expression();
            self.allow_in = true;
            let expr = expr?;
            if self.is_word("in") {
                let ExprKind::Ident(name) = expr.kind else {
                    return Err(self
                        .source
                        .syntax_error("invalid left-hand side in for-in", expr.span));
                };
                self.advance();
                return self.for_in_rest(false, name);
            }
            Some(Box::new(Stmt {
                span: expr.span,
                kind: StmtKind::Expr(expr),
            }))
        };

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn for_in_rest(&mut self, declare: bool, name: String) -> Result<StmtKind, RigError> {
        let object = self.expression()?;
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::ForIn {
            declare,
            name,
            object,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<StmtKind, RigError> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_word("catch") {
            self.expect_punct("(")?;
            param = Some(self.identifier()?.0);
            self.expect_punct(")")?;
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_word("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }
        Ok(StmtKind::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    /// Parses after the `function` keyword.
    fn function_rest(&mut self, start: usize, needs_name: bool) -> Result<Rc<FunctionDef>, RigError> {
        let name = if needs_name || matches!(self.peek().kind, TokenKind::Word(_)) {
            Some(self.identifier()?.0)
        } else {
            None
        };
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.is_punct(")") {
            loop {
                params.push(self.identifier()?.0);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        let saved = std::mem::replace(&mut self.allow_in, true);
        let body = self.block();
        self.allow_in = saved;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: body?,
            span: Span::new(start, self.last_end()),
        }))
    }

    // ------------------------------------------------------------------------
    // EXPRESSIONS
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, RigError> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let start = first.span.start;
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(items),
            span: Span::new(start, self.last_end()),
        })
    }

    fn assignment(&mut self) -> Result<Expr, RigError> {
        let target = self.conditional()?;
        let op = match &self.peek().kind {
            TokenKind::Punct("=") => None,
            TokenKind::Punct(p) => match compound_op(p) {
                Some(op) => Some(op),
                None => return Ok(target),
            },
            _ => return Ok(target),
        };
        if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
            return Err(self
                .source
                .syntax_error("invalid assignment target", target.span));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr {
            span: target.span.to(value.span),
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        })
    }

    fn conditional(&mut self) -> Result<Expr, RigError> {
        let test = self.logical(false)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let saved = std::mem::replace(&mut self.allow_in, true);
        let consequent = self.assignment();
        self.allow_in = saved;
        let consequent = consequent?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr {
            span: test.span.to(alternate.span),
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    /// `||` when `and` is false, `&&` otherwise.
    fn logical(&mut self, and: bool) -> Result<Expr, RigError> {
        let (op, mut left) = if and {
            ("&&", self.binary(0)?)
        } else {
            ("||", self.logical(true)?)
        };
        while self.eat_punct(op) {
            let right = if and {
                self.binary(0)?
            } else {
                self.logical(true)?
            };
            left = Expr {
                span: left.span.to(right.span),
                kind: ExprKind::Logical {
                    and,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    /// Precedence climbing over the binary operators.
    fn binary(&mut self, min_prec: u8) -> Result<Expr, RigError> {
        let mut left = self.unary()?;
        while let Some((prec, op)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.binary(prec + 1)?;
            left = Expr {
                span: left.span.to(right.span),
                kind: ExprKind::Binary(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn binary_op(&self) -> Option<(u8, BinaryOp)> {
        let op = match &self.peek().kind {
            TokenKind::Punct(p) => match *p {
                "|" => (1, BinaryOp::BitOr),
                "^" => (2, BinaryOp::BitXor),
                "&" => (3, BinaryOp::BitAnd),
                "==" => (4, BinaryOp::Eq),
                "!=" => (4, BinaryOp::Ne),
                "===" => (4, BinaryOp::StrictEq),
                "!==" => (4, BinaryOp::StrictNe),
                "<" => (5, BinaryOp::Lt),
                ">" => (5, BinaryOp::Gt),
                "<=" => (5, BinaryOp::Le),
                ">=" => (5, BinaryOp::Ge),
                "<<" => (6, BinaryOp::Shl),
                ">>" => (6, BinaryOp::Shr),
                ">>>" => (6, BinaryOp::UShr),
                "+" => (7, BinaryOp::Add),
                "-" => (7, BinaryOp::Sub),
                "*" => (8, BinaryOp::Mul),
                "/" => (8, BinaryOp::Div),
                "%" => (8, BinaryOp::Rem),
                _ => return None,
            },
            TokenKind::Word(w) if w == "instanceof" => (5, BinaryOp::InstanceOf),
            TokenKind::Word(w) if w == "in" && self.allow_in => (5, BinaryOp::In),
            _ => return None,
        };
        Some(op)
    }

    fn unary(&mut self) -> Result<Expr, RigError> {
        let token = self.peek().clone();
        let op = match &token.kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Word(w) if w == "typeof" => Some(UnaryOp::TypeOf),
            TokenKind::Word(w) if w == "void" => Some(UnaryOp::Void),
            TokenKind::Word(w) if w == "delete" => Some(UnaryOp::Delete),
            TokenKind::Punct(p @ ("++" | "--")) => {
                let increment = *p == "++";
                self.advance();
                let target = self.unary()?;
                self.check_update_target(&target)?;
                return Ok(Expr {
                    span: token.span.to(target.span),
                    kind: ExprKind::Update {
                        increment,
                        prefix: true,
                        target: Box::new(target),
                    },
                });
            }
            _ => None,
        };
        let Some(op) = op else {
            return self.postfix();
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr {
            span: token.span.to(operand.span),
            kind: ExprKind::Unary(op, Box::new(operand)),
        })
    }

    fn check_update_target(&self, target: &Expr) -> Result<(), RigError> {
        match target.kind {
            ExprKind::Ident(_) | ExprKind::Member { .. } => Ok(()),
            _ => Err(self
                .source
                .syntax_error("invalid increment/decrement target", target.span)),
        }
    }

    fn postfix(&mut self) -> Result<Expr, RigError> {
        let target = self.call_expression()?;
        let increment = match &self.peek().kind {
            TokenKind::Punct("++") if !self.peek().newline_before => true,
            TokenKind::Punct("--") if !self.peek().newline_before => false,
            _ => return Ok(target),
        };
        self.check_update_target(&target)?;
        let end = self.advance().span;
        Ok(Expr {
            span: target.span.to(end),
            kind: ExprKind::Update {
                increment,
                prefix: false,
                target: Box::new(target),
            },
        })
    }

    fn call_expression(&mut self) -> Result<Expr, RigError> {
        let mut expr = if self.is_word("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr {
                    span: Span::new(expr.span.start, self.last_end()),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.at_member() {
                expr = self.member(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn new_expression(&mut self) -> Result<Expr, RigError> {
        let start = self.advance().span.start;
        let mut callee = if self.is_word("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        while self.at_member() {
            callee = self.member(callee)?;
        }
        let args = if self.is_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            span: Span::new(start, self.last_end()),
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        })
    }

    fn at_member(&self) -> bool {
        self.is_punct(".") || self.is_punct("[")
    }

    /// `.name` or `[expr]` applied to `object`.
    fn member(&mut self, object: Expr) -> Result<Expr, RigError> {
        let property = if self.eat_punct(".") {
            match &self.peek().kind {
                TokenKind::Word(w) => {
                    let name = w.clone();
                    self.advance();
                    MemberKey::Named(name)
                }
                _ => return Err(self.unexpected("a property name")),
            }
        } else if self.eat_punct("[") {
            let saved = std::mem::replace(&mut self.allow_in, true);
            let key = self.expression();
            self.allow_in = saved;
            let key = key?;
            self.expect_punct("]")?;
            MemberKey::Computed(Box::new(key))
        } else {
            return Err(self.unexpected("'.' or '['"));
        };
        Ok(Expr {
            span: Span::new(object.span.start, self.last_end()),
            kind: ExprKind::Member {
                object: Box::new(object),
                property,
            },
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, RigError> {
        self.expect_punct("(")?;
        let saved = std::mem::replace(&mut self.allow_in, true);
        let mut args = Vec::new();
        let result = loop {
            if self.eat_punct(")") {
                break Ok(args);
            }
            match self.assignment() {
                Ok(arg) => args.push(arg),
                Err(e) => break Err(e),
            }
            if !self.is_punct(")") {
                if let Err(e) = self.expect_punct(",") {
                    break Err(e);
                }
            }
        };
        self.allow_in = saved;
        result
    }

    fn primary(&mut self) -> Result<Expr, RigError> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::Punct("(") => {
                self.advance();
                let saved = std::mem::replace(&mut self.allow_in, true);
                let inner = self.expression();
                self.allow_in = saved;
                let inner = inner?;
                self.expect_punct(")")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: Span::new(token.span.start, self.last_end()),
                });
            }
            TokenKind::Punct("[") => self.array_literal()?,
            TokenKind::Punct("{") => self.object_literal()?,
            TokenKind::Word(ref w) => match w.as_str() {
                "true" | "false" => {
                    self.advance();
                    ExprKind::Bool(w == "true")
                }
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "this" => {
                    self.advance();
                    ExprKind::This
                }
                "function" => {
                    self.advance();
                    ExprKind::Function(self.function_rest(token.span.start, false)?)
                }
                _ => ExprKind::Ident(self.identifier()?.0),
            },
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr {
            kind,
            span: Span::new(token.span.start, self.last_end()),
        })
    }

    fn array_literal(&mut self) -> Result<ExprKind, RigError> {
        self.advance();
        let saved = std::mem::replace(&mut self.allow_in, true);
        let mut items = Vec::new();
        let result = loop {
            if self.eat_punct("]") {
                break Ok(ExprKind::Array(items));
            }
            match self.assignment() {
                Ok(item) => items.push(item),
                Err(e) => break Err(e),
            }
            if !self.is_punct("]") {
                if let Err(e) = self.expect_punct(",") {
                    break Err(e);
                }
            }
        };
        self.allow_in = saved;
        result
    }

    fn object_literal(&mut self) -> Result<ExprKind, RigError> {
        self.advance();
        let saved = std::mem::replace(&mut self.allow_in, true);
        let result = self.object_properties();
        self.allow_in = saved;
        result.map(ExprKind::Object)
    }

    fn object_properties(&mut self) -> Result<Vec<(String, Expr)>, RigError> {
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}") {
                return Ok(props);
            }
            let key = match &self.peek().kind {
                TokenKind::Word(w) => w.clone(),
                TokenKind::Str(s) => s.clone(),
                TokenKind::Number(n) => number_key(*n),
                _ => return Err(self.unexpected("a property name")),
            };
            self.advance();
            self.expect_punct(":")?;
            props.push((key, self.assignment()?));
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
    }
}

fn compound_op(p: &str) -> Option<BinaryOp> {
    Some(match p {
        "+=" => BinaryOp::Add,
        "-=" => BinaryOp::Sub,
        "*=" => BinaryOp::Mul,
        "/=" => BinaryOp::Div,
        "%=" => BinaryOp::Rem,
        "<<=" => BinaryOp::Shl,
        ">>=" => BinaryOp::Shr,
        ">>>=" => BinaryOp::UShr,
        "&=" => BinaryOp::BitAnd,
        "|=" => BinaryOp::BitOr,
        "^=" => BinaryOp::BitXor,
        _ => return None,
    })
}

fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Program {
        parse(&SourceContext::from_file("t.js", src), false).expect("parse")
    }

    fn first_expr(src: &str) -> ExprKind {
        match program(src).body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e.kind,
            other => panic!("not an expression statement: {other:?}"),
        }
    }

    #[test]
    fn newline_inserts_semicolons() {
        let p = program("var a = 1\nvar b = 2\nprint(a)");
        assert_eq!(p.body.len(), 3);
    }

    #[test]
    fn shift_continues_across_lines() {
        let p = program("var x = 1\n<<\n3;");
        assert_eq!(p.body.len(), 1);
        let StmtKind::Var(decls) = &p.body[0].kind else {
            panic!("expected var");
        };
        assert!(matches!(
            decls[0].init.as_ref().map(|e| &e.kind),
            Some(ExprKind::Binary(BinaryOp::Shl, _, _))
        ));
    }

    #[test]
    fn return_before_newline_returns_nothing() {
        let p = program("function f() { return\n1 }");
        let StmtKind::Function(def) = &p.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(def.body.len(), 2);
        assert!(matches!(def.body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let ExprKind::Binary(BinaryOp::Add, _, right) = first_expr("1 + 2 * 3") else {
            panic!("expected addition at the root");
        };
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn for_in_and_classic_for() {
        let p = program("for (var k in o) {}\nfor (var i = 0; i < 3; i++) {}\nfor (k in o);");
        assert!(matches!(p.body[0].kind, StmtKind::ForIn { declare: true, .. }));
        assert!(matches!(p.body[1].kind, StmtKind::For { .. }));
        assert!(matches!(p.body[2].kind, StmtKind::ForIn { declare: false, .. }));
    }

    #[test]
    fn object_literal_keeps_key_order() {
        let ExprKind::Assign { value, .. } = first_expr("o = { b: 1, 'a': 2, 3: x = 4 }") else {
            panic!("expected assignment");
        };
        let ExprKind::Object(props) = value.kind else {
            panic!("expected object literal");
        };
        let keys: Vec<_> = props.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "3"]);
        assert!(matches!(props[2].1.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn new_with_member_callee() {
        let ExprKind::New { callee, args } = first_expr("new a.B(1)") else {
            panic!("expected new");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn missing_semicolon_on_one_line_is_an_error() {
        let err = parse(&SourceContext::from_file("t.js", "a b"), false).expect_err("error");
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn invalid_assignment_target() {
        assert!(parse(&SourceContext::from_file("t.js", "1 = 2"), false).is_err());
    }
}
