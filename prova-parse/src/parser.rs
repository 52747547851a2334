#![forbid(unsafe_code)]

use std::mem;

use prova_ast::{
    join, span_between, AssignStmt, AttrArg, Attribute, BinOp, Block, ConstDef, Expr, ExprKind,
    FieldDef, FunDef, Ident, Item, LetStmt, Module, Param, Path, Program, Span, Stmt, StructDef,
    TypeRef, TypeRefKind, UnaryOp, UseDecl, UseMember, Visibility,
};
use prova_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut modules = Vec::new();
        while !self.at(TokenKind::Eof) {
            modules.push(self.parse_module()?);
        }
        if modules.is_empty() {
            return Err(ParseError {
                message: "expected at least one `module` declaration".to_string(),
                span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
            });
        }
        Ok(Program { modules })
    }

    fn parse_module(&mut self) -> Result<Module, ParseError> {
        // Module-level attributes (`#[test_only]`, ...) carry no meaning for verification.
        let _ = self.parse_attrs()?;
        let kw = self.expect(TokenKind::KwModule)?;
        let address = self.expect_ident()?;
        self.expect(TokenKind::ColonColon)?;
        let name = self.expect_ident()?;

        let mut items = Vec::new();
        if self.at(TokenKind::LBrace) {
            self.expect_any()?;
            while !self.at(TokenKind::RBrace) {
                if self.at(TokenKind::Eof) {
                    return Err(ParseError {
                        message: "unterminated module; expected '}'".to_string(),
                        span: name.span,
                    });
                }
                items.push(self.parse_item()?);
            }
            let rb = self.expect(TokenKind::RBrace)?;
            return Ok(Module {
                span: join(kw.span, rb.span),
                address,
                name,
                items,
            });
        }

        // Label form: `module a::b;` followed by items until end of file.
        let semi = self.expect(TokenKind::Semi)?;
        let mut end = semi.span;
        while !self.at(TokenKind::Eof) {
            let item = self.parse_item()?;
            end = item_span(&item);
            items.push(item);
        }
        Ok(Module {
            span: join(kw.span, end),
            address,
            name,
            items,
        })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let attrs = self.parse_attrs()?;
        let start = self.peek_span().unwrap_or_else(|| span_between(0, 0));

        match self.peek_kind() {
            Some(TokenKind::KwUse) => Ok(Item::Use(self.parse_use(attrs)?)),
            Some(TokenKind::KwConst) => Ok(Item::Const(self.parse_const(attrs)?)),
            Some(
                TokenKind::KwPublic
                | TokenKind::KwEntry
                | TokenKind::KwNative
                | TokenKind::KwFun
                | TokenKind::KwStruct,
            ) => {
                let (visibility, is_native) = self.parse_fun_modifiers()?;
                if self.at(TokenKind::KwStruct) {
                    if is_native {
                        return Err(ParseError {
                            message: "native structs are not supported".to_string(),
                            span: start,
                        });
                    }
                    let is_public = visibility != Visibility::Private;
                    return Ok(Item::Struct(self.parse_struct(attrs, is_public, start)?));
                }
                Ok(Item::Fun(self.parse_fun(attrs, visibility, is_native, start)?))
            }
            _ => Err(ParseError {
                message: "expected `use`, `const`, `struct` or `fun`".to_string(),
                span: start,
            }),
        }
    }

    fn parse_attrs(&mut self) -> Result<Vec<Attribute>, ParseError> {
        let mut attrs = Vec::new();
        while self.at(TokenKind::Hash) {
            self.expect_any()?;
            self.expect(TokenKind::LBracket)?;
            loop {
                attrs.push(self.parse_attr()?);
                if self.at(TokenKind::Comma) {
                    self.expect_any()?;
                    continue;
                }
                break;
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(attrs)
    }

    fn parse_attr(&mut self) -> Result<Attribute, ParseError> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        let mut end = name.span;
        if self.at(TokenKind::LParen) {
            self.expect_any()?;
            while !self.at(TokenKind::RParen) {
                let key = self.expect_ident()?;
                if self.at(TokenKind::Eq) {
                    self.expect_any()?;
                    let value = self.parse_attr_value()?;
                    args.push(AttrArg::KeyValue { key, value });
                } else {
                    args.push(AttrArg::Flag(key));
                }
                if self.at(TokenKind::Comma) {
                    self.expect_any()?;
                } else {
                    break;
                }
            }
            end = self.expect(TokenKind::RParen)?.span;
        }
        Ok(Attribute {
            span: join(name.span, end),
            name,
            args,
        })
    }

    fn parse_attr_value(&mut self) -> Result<Path, ParseError> {
        if let Some(TokenKind::Int { value, .. }) = self.peek_kind().cloned() {
            let tok = self.expect_any()?;
            return Ok(vec![Ident::new(tok.span, value.to_string())]);
        }
        self.parse_path()
    }

    fn parse_path(&mut self) -> Result<Path, ParseError> {
        let mut path = vec![self.expect_ident()?];
        while self.at(TokenKind::ColonColon) && matches!(self.peek_kind_n(1), Some(TokenKind::Ident(_))) {
            self.expect_any()?;
            path.push(self.expect_ident()?);
        }
        Ok(path)
    }

    fn parse_use(&mut self, attrs: Vec<Attribute>) -> Result<UseDecl, ParseError> {
        let kw = self.expect(TokenKind::KwUse)?;
        let mut path = vec![self.expect_ident()?];
        let mut members = None;

        while self.at(TokenKind::ColonColon) {
            self.expect_any()?;
            if self.at(TokenKind::LBrace) {
                self.expect_any()?;
                let mut list = Vec::new();
                while !self.at(TokenKind::RBrace) {
                    let name = self.expect_ident()?;
                    let alias = self.parse_use_alias()?;
                    list.push(UseMember { name, alias });
                    if self.at(TokenKind::Comma) {
                        self.expect_any()?;
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                members = Some(list);
                break;
            }
            path.push(self.expect_ident()?);
        }

        let alias = if members.is_none() {
            self.parse_use_alias()?
        } else {
            None
        };
        let semi = self.expect(TokenKind::Semi)?;

        if members.is_none() && path.len() < 2 {
            return Err(ParseError {
                message: "`use` needs at least `address::module`".to_string(),
                span: join(kw.span, semi.span),
            });
        }

        Ok(UseDecl {
            span: join(kw.span, semi.span),
            attrs,
            path,
            alias,
            members,
        })
    }

    fn parse_use_alias(&mut self) -> Result<Option<Ident>, ParseError> {
        if self.at(TokenKind::KwAs) {
            self.expect_any()?;
            return Ok(Some(self.expect_ident()?));
        }
        Ok(None)
    }

    fn parse_const(&mut self, attrs: Vec<Attribute>) -> Result<ConstDef, ParseError> {
        let kw = self.expect(TokenKind::KwConst)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(ConstDef {
            span: join(kw.span, semi.span),
            attrs,
            name,
            ty,
            value,
        })
    }

    fn parse_fun_modifiers(&mut self) -> Result<(Visibility, bool), ParseError> {
        let mut visibility = Visibility::Private;
        let mut is_native = false;
        loop {
            match self.peek_kind() {
                Some(TokenKind::KwPublic) => {
                    self.expect_any()?;
                    visibility = Visibility::Public;
                    if self.at(TokenKind::LParen) {
                        self.expect_any()?;
                        self.expect_ident()?;
                        self.expect(TokenKind::RParen)?;
                        visibility = Visibility::Package;
                    }
                }
                Some(TokenKind::KwEntry) => {
                    self.expect_any()?;
                    visibility = Visibility::Entry;
                }
                Some(TokenKind::KwNative) => {
                    self.expect_any()?;
                    is_native = true;
                }
                _ => break,
            }
        }
        Ok((visibility, is_native))
    }

    fn parse_type_params(&mut self) -> Result<Vec<Ident>, ParseError> {
        let mut params = Vec::new();
        if !self.at(TokenKind::Lt) {
            return Ok(params);
        }
        self.expect_any()?;
        while !self.at(TokenKind::Gt) {
            let mut name = self.expect_ident()?;
            // `phantom T`
            if name.node == "phantom" && matches!(self.peek_kind(), Some(TokenKind::Ident(_))) {
                name = self.expect_ident()?;
            }
            if self.at(TokenKind::Colon) {
                self.expect_any()?;
                self.expect_ident()?;
                while self.at(TokenKind::Plus) {
                    self.expect_any()?;
                    self.expect_ident()?;
                }
            }
            params.push(name);
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    fn parse_abilities(&mut self) -> Result<Vec<Ident>, ParseError> {
        let mut abilities = Vec::new();
        if !self.at(TokenKind::KwHas) {
            return Ok(abilities);
        }
        self.expect_any()?;
        loop {
            abilities.push(self.expect_ident()?);
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
                continue;
            }
            break;
        }
        Ok(abilities)
    }

    fn parse_struct(&mut self, attrs: Vec<Attribute>, is_public: bool, start: Span) -> Result<StructDef, ParseError> {
        self.expect(TokenKind::KwStruct)?;
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        let mut abilities = self.parse_abilities()?;

        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let fname = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push(FieldDef {
                span: join(fname.span, ty.span),
                name: fname,
                ty,
            });
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        let mut end = self.expect(TokenKind::RBrace)?.span;

        // Legacy placement: `struct S { .. } has key;`
        if abilities.is_empty() && self.at(TokenKind::KwHas) {
            abilities = self.parse_abilities()?;
            end = self.expect(TokenKind::Semi)?.span;
        }

        Ok(StructDef {
            span: join(start, end),
            attrs,
            is_public,
            name,
            type_params,
            abilities,
            fields,
        })
    }

    fn parse_fun(
        &mut self,
        attrs: Vec<Attribute>,
        visibility: Visibility,
        is_native: bool,
        start: Span,
    ) -> Result<FunDef, ParseError> {
        self.expect(TokenKind::KwFun)?;
        let name = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;

        let ret = if self.at(TokenKind::Colon) {
            self.expect_any()?;
            Some(self.parse_type()?)
        } else {
            None
        };

        if self.at(TokenKind::Semi) {
            let semi = self.expect_any()?;
            if !is_native {
                return Err(ParseError {
                    message: format!("function `{}` has no body; only `native fun` may omit it", name.node),
                    span: semi.span,
                });
            }
            return Ok(FunDef {
                span: join(start, semi.span),
                attrs,
                visibility,
                is_native,
                name,
                type_params,
                params,
                ret,
                body: None,
            });
        }

        if is_native {
            return Err(ParseError {
                message: format!("native function `{}` cannot have a body", name.node),
                span: name.span,
            });
        }

        let body = self.parse_block()?;
        Ok(FunDef {
            span: join(start, body.span),
            attrs,
            visibility,
            is_native,
            name,
            type_params,
            params,
            ret,
            body: Some(body),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            // `mut` parameters only affect local mutability.
            if self.at(TokenKind::KwMut) {
                self.expect_any()?;
            }
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                span: join(name.span, ty.span),
                name,
                ty,
            });
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    pub fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        if self.at(TokenKind::Amp) {
            let amp = self.expect_any()?;
            let mutable = if self.at(TokenKind::KwMut) {
                self.expect_any()?;
                true
            } else {
                false
            };
            let inner = self.parse_type()?;
            return Ok(TypeRef {
                span: join(amp.span, inner.span),
                kind: TypeRefKind::Ref {
                    mutable,
                    inner: Box::new(inner),
                },
            });
        }

        if self.at(TokenKind::LParen) {
            let lp = self.expect_any()?;
            let rp = self.expect(TokenKind::RParen)?;
            return Ok(TypeRef {
                span: join(lp.span, rp.span),
                kind: TypeRefKind::Unit,
            });
        }

        let path = self.parse_path()?;
        let mut end = path.last().map(|p| p.span).unwrap_or_else(|| span_between(0, 0));
        let mut args = Vec::new();
        if self.at(TokenKind::Lt) {
            self.expect_any()?;
            while !self.at(TokenKind::Gt) {
                args.push(self.parse_type()?);
                if self.at(TokenKind::Comma) {
                    self.expect_any()?;
                } else {
                    break;
                }
            }
            end = self.expect(TokenKind::Gt)?.span;
        }
        Ok(TypeRef {
            span: join(path[0].span, end),
            kind: TypeRefKind::Named { path, args },
        })
    }

    pub fn parse_block(&mut self) -> Result<Block, ParseError> {
        let lb = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        let mut tail: Option<Box<Expr>> = None;

        loop {
            if self.at(TokenKind::RBrace) {
                let rb = self.expect_any()?;
                return Ok(Block {
                    span: join(lb.span, rb.span),
                    stmts,
                    tail,
                });
            }
            if self.at(TokenKind::Eof) {
                return Err(ParseError {
                    message: "unterminated block; expected '}'".to_string(),
                    span: lb.span,
                });
            }
            if let Some(t) = &tail {
                return Err(ParseError {
                    message: "expected `;` after expression".to_string(),
                    span: t.span,
                });
            }

            match self.peek_kind() {
                Some(TokenKind::KwUse) => {
                    stmts.push(Stmt::Use(self.parse_use(Vec::new())?));
                    continue;
                }
                Some(TokenKind::KwLet) => {
                    stmts.push(Stmt::Let(self.parse_let()?));
                    continue;
                }
                Some(TokenKind::Semi) => {
                    // Stray `;` after a block-like statement.
                    self.expect_any()?;
                    continue;
                }
                _ => {}
            }

            let expr = self.parse_expr()?;
            if self.at(TokenKind::Eq) {
                self.expect_any()?;
                let value = self.parse_expr()?;
                let semi = self.expect(TokenKind::Semi)?;
                stmts.push(Stmt::Assign(AssignStmt {
                    span: join(expr.span, semi.span),
                    target: expr,
                    expr: value,
                }));
            } else if self.at(TokenKind::Semi) {
                self.expect_any()?;
                stmts.push(Stmt::Expr(expr));
            } else if self.at(TokenKind::RBrace) {
                tail = Some(Box::new(expr));
            } else if expr.is_block_like() {
                stmts.push(Stmt::Expr(expr));
            } else {
                return Err(ParseError {
                    message: "expected `;`".to_string(),
                    span: self.peek_span().unwrap_or(expr.span),
                });
            }
        }
    }

    fn parse_let(&mut self) -> Result<LetStmt, ParseError> {
        let kw = self.expect(TokenKind::KwLet)?;
        let mutable = if self.at(TokenKind::KwMut) {
            self.expect_any()?;
            true
        } else {
            false
        };
        let name = self.expect_ident()?;
        let ty = if self.at(TokenKind::Colon) {
            self.expect_any()?;
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq)?;
        let expr = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semi)?;
        Ok(LetStmt {
            span: join(kw.span, semi.span),
            mutable,
            name,
            ty,
            expr,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_implies_expr()
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError {
                message: "expected end of input".to_string(),
                span: self.peek_span().unwrap_or_else(|| span_between(0, 0)),
            });
        }
        Ok(expr)
    }

    /// `a ==> b` binds loosest and associates to the right.
    fn parse_implies_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_or_expr()?;
        if !self.at(TokenKind::Implies) {
            return Ok(left);
        }
        self.expect_any()?;
        let right = self.parse_implies_expr()?;
        Ok(binary(left, BinOp::Implies, right))
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.at(TokenKind::OrOr) {
            self.expect_any()?;
            let right = self.parse_and_expr()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_cmp_expr()?;
        while self.at(TokenKind::AndAnd) {
            self.expect_any()?;
            let right = self.parse_cmp_expr()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_add_expr()?;
        let Some(op) = self.peek_cmp_op() else {
            return Ok(left);
        };
        self.expect_any()?;
        let right = self.parse_add_expr()?;
        let expr = binary(left, op, right);

        if self.peek_cmp_op().is_some() {
            let span = self.peek_span().unwrap_or(expr.span);
            return Err(ParseError {
                message: "chained comparisons are not supported; use parentheses or boolean operators".to_string(),
                span,
            });
        }
        Ok(expr)
    }

    fn peek_cmp_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            Some(TokenKind::EqEq) => Some(BinOp::Eq),
            Some(TokenKind::Neq) => Some(BinOp::Ne),
            Some(TokenKind::Lt) => Some(BinOp::Lt),
            Some(TokenKind::Gt) => Some(BinOp::Gt),
            Some(TokenKind::Le) => Some(BinOp::Le),
            Some(TokenKind::Ge) => Some(BinOp::Ge),
            _ => None,
        }
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.expect_any()?;
            let right = self.parse_mul_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.expect_any()?;
            let right = self.parse_unary_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Star) => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            let t = self.expect_any()?;
            let expr = self.parse_unary_expr()?;
            return Ok(Expr {
                span: join(t.span, expr.span),
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }

        if self.at(TokenKind::Amp) {
            let t = self.expect_any()?;
            let mutable = if self.at(TokenKind::KwMut) {
                self.expect_any()?;
                true
            } else {
                false
            };
            let expr = self.parse_unary_expr()?;
            return Ok(Expr {
                span: join(t.span, expr.span),
                kind: ExprKind::Borrow {
                    mutable,
                    expr: Box::new(expr),
                },
            });
        }

        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            if self.at(TokenKind::Dot) {
                self.expect_any()?;
                let member = self.expect_ident()?;
                let type_args = self.try_parse_generic_args()?.unwrap_or_default();
                if self.at(TokenKind::LParen) {
                    let (args, end) = self.parse_call_args()?;
                    expr = Expr {
                        span: join(expr.span, end),
                        kind: ExprKind::MethodCall {
                            receiver: Box::new(expr),
                            method: member,
                            type_args,
                            args,
                        },
                    };
                    continue;
                }
                if !type_args.is_empty() {
                    return Err(ParseError {
                        message: "type arguments are only allowed on calls".to_string(),
                        span: member.span,
                    });
                }
                expr = Expr {
                    span: join(expr.span, member.span),
                    kind: ExprKind::Field {
                        base: Box::new(expr),
                        field: member,
                    },
                };
                continue;
            }

            break;
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::LBrace) {
            let block = self.parse_block()?;
            return Ok(Expr {
                span: block.span,
                kind: ExprKind::Block(block),
            });
        }

        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Int { value, suffix } => Ok(Expr {
                span: tok.span,
                kind: ExprKind::IntLit { value, suffix },
            }),
            TokenKind::KwTrue | TokenKind::KwFalse => Ok(Expr {
                span: tok.span,
                kind: ExprKind::BoolLit(matches!(tok.kind, TokenKind::KwTrue)),
            }),
            TokenKind::LParen => {
                if self.at(TokenKind::RParen) {
                    let rp = self.expect_any()?;
                    return Ok(Expr {
                        span: join(tok.span, rp.span),
                        kind: ExprKind::Unit,
                    });
                }
                let inner = self.parse_expr()?;
                // Casts are always parenthesized: `(e as T)` casts the whole of `e`.
                if self.at(TokenKind::KwAs) {
                    self.expect_any()?;
                    let ty = self.parse_type()?;
                    let rp = self.expect(TokenKind::RParen)?;
                    return Ok(Expr {
                        span: join(tok.span, rp.span),
                        kind: ExprKind::Cast {
                            expr: Box::new(inner),
                            ty,
                        },
                    });
                }
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Expr {
                    span: join(tok.span, rp.span),
                    kind: inner.kind,
                })
            }
            TokenKind::KwIf => self.parse_if_after_kw(tok.span),
            TokenKind::KwAbort => {
                let code = self.parse_expr()?;
                Ok(Expr {
                    span: join(tok.span, code.span),
                    kind: ExprKind::Abort(Box::new(code)),
                })
            }
            TokenKind::KwWhile | TokenKind::KwLoop => Err(ParseError {
                message: "loops are not supported by the verifier".to_string(),
                span: tok.span,
            }),
            TokenKind::KwReturn => Err(ParseError {
                message: "`return` is not supported; use the block's trailing expression".to_string(),
                span: tok.span,
            }),
            TokenKind::Ident(first) => {
                let mut path = vec![Ident::new(tok.span, first)];
                while self.at(TokenKind::ColonColon) {
                    self.expect_any()?;
                    path.push(self.expect_ident()?);
                }

                if path.len() == 1 && self.at(TokenKind::Bang) && matches!(self.peek_kind_n(1), Some(TokenKind::LParen)) {
                    self.expect_any()?;
                    let (args, end) = self.parse_call_args()?;
                    let name = path.remove(0);
                    return Ok(Expr {
                        span: join(name.span, end),
                        kind: ExprKind::MacroCall { name, args },
                    });
                }

                let type_args = self.try_parse_generic_args()?.unwrap_or_default();
                let start = path[0].span;

                if self.at(TokenKind::LParen) {
                    let (args, end) = self.parse_call_args()?;
                    return Ok(Expr {
                        span: join(start, end),
                        kind: ExprKind::Call {
                            callee: path,
                            type_args,
                            args,
                        },
                    });
                }

                let is_type_name = path
                    .last()
                    .and_then(|p| p.node.chars().next())
                    .is_some_and(|c| c.is_ascii_uppercase());
                if self.at(TokenKind::LBrace) && is_type_name {
                    return self.parse_pack(path, type_args);
                }

                if !type_args.is_empty() {
                    return Err(ParseError {
                        message: "type arguments are only allowed on calls and struct packs".to_string(),
                        span: start,
                    });
                }

                let end = path.last().map(|p| p.span).unwrap_or(start);
                Ok(Expr {
                    span: join(start, end),
                    kind: ExprKind::Path(path),
                })
            }
            _ => Err(ParseError {
                message: "expected expression".to_string(),
                span: tok.span,
            }),
        }
    }

    fn parse_if_after_kw(&mut self, kw: Span) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_branch()?;
        let mut end = then_block.span;

        let else_block = if self.at(TokenKind::KwElse) {
            self.expect_any()?;
            let b = self.parse_branch()?;
            end = b.span;
            Some(b)
        } else {
            None
        };

        Ok(Expr {
            span: join(kw, end),
            kind: ExprKind::If {
                cond: Box::new(cond),
                then_block,
                else_block,
            },
        })
    }

    /// A branch is either a `{ block }` or a single expression.
    fn parse_branch(&mut self) -> Result<Block, ParseError> {
        if self.at(TokenKind::LBrace) {
            return self.parse_block();
        }
        let expr = self.parse_expr()?;
        Ok(Block {
            span: expr.span,
            stmts: Vec::new(),
            tail: Some(Box::new(expr)),
        })
    }

    fn parse_pack(&mut self, name: Path, type_args: Vec<TypeRef>) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let fname = self.expect_ident()?;
            let value = if self.at(TokenKind::Colon) {
                self.expect_any()?;
                self.parse_expr()?
            } else {
                // Field punning: `S { x }`
                Expr {
                    span: fname.span,
                    kind: ExprKind::Path(vec![fname.clone()]),
                }
            };
            fields.push((fname, value));
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        let rb = self.expect(TokenKind::RBrace)?;
        Ok(Expr {
            span: join(name[0].span, rb.span),
            kind: ExprKind::Pack {
                name,
                type_args,
                fields,
            },
        })
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        let rp = self.expect(TokenKind::RParen)?;
        Ok((args, rp.span))
    }

    fn try_parse_generic_args(&mut self) -> Result<Option<Vec<TypeRef>>, ParseError> {
        if !self.at(TokenKind::Lt) {
            return Ok(None);
        }

        // Lookahead: `< types > (` or `< types > {`. Anything else is a comparison.
        let mut j = self.idx;
        let mut depth = 0usize;
        let mut close = None;
        while let Some(tok) = self.tokens.get(j) {
            match tok.kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(j);
                        break;
                    }
                }
                TokenKind::Ident(_)
                | TokenKind::ColonColon
                | TokenKind::Comma
                | TokenKind::Amp
                | TokenKind::KwMut => {}
                _ => return Ok(None),
            }
            j += 1;
        }
        let Some(close) = close else {
            return Ok(None);
        };
        if !matches!(
            self.tokens.get(close + 1).map(|t| &t.kind),
            Some(TokenKind::LParen | TokenKind::LBrace)
        ) {
            return Ok(None);
        }

        self.expect(TokenKind::Lt)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::Gt) {
            args.push(self.parse_type()?);
            if self.at(TokenKind::Comma) {
                self.expect_any()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(Some(args))
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            _ => Err(ParseError {
                message: "expected identifier".to_string(),
                span: tok.span,
            }),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {expected:?}"),
                span: tok.span,
            })
        }
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        self.next().ok_or_else(|| ParseError {
            message: "unexpected end of input".to_string(),
            span: self
                .tokens
                .last()
                .map(|t| t.span)
                .unwrap_or_else(|| span_between(0, 0)),
        })
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        self.idx += 1;
        Some(tok)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.idx).map(|t| t.span)
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr {
        span: join(left.span, right.span),
        kind: ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
    }
}

fn item_span(item: &Item) -> Span {
    match item {
        Item::Use(u) => u.span,
        Item::Const(c) => c.span,
        Item::Struct(s) => s.span,
        Item::Fun(f) => f.span,
    }
}
