#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use logos::Logos;
use miette::Diagnostic;
use num::BigUint;
use prova_ast::{span_between, Span};
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(prova::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

type IntLit = Option<(BigUint, Option<String>)>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum RawToken {
    #[token("module")]
    KwModule,
    #[token("use")]
    KwUse,
    #[token("public")]
    KwPublic,
    #[token("entry")]
    KwEntry,
    #[token("native")]
    KwNative,
    #[token("fun")]
    KwFun,
    #[token("struct")]
    KwStruct,
    #[token("has")]
    KwHas,
    #[token("const")]
    KwConst,
    #[token("let")]
    KwLet,
    #[token("mut")]
    KwMut,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("abort")]
    KwAbort,
    #[token("as")]
    KwAs,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("while")]
    KwWhile,
    #[token("loop")]
    KwLoop,
    #[token("return")]
    KwReturn,

    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("==>")]
    Implies,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("#")]
    Hash,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"0x[0-9a-fA-F_]+(u8|u16|u32|u64|u128|u256)?", |lex| parse_int(lex.slice(), 16))]
    #[regex(r"[0-9][0-9_]*(u8|u16|u32|u64|u128|u256)?", |lex| parse_int(lex.slice(), 10))]
    Int(IntLit),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

const SUFFIXES: [&str; 6] = ["u128", "u256", "u16", "u32", "u64", "u8"];

fn parse_int(s: &str, radix: u32) -> IntLit {
    let (body, suffix) = match SUFFIXES.iter().find(|sfx| s.ends_with(*sfx)) {
        Some(sfx) => (&s[..s.len() - sfx.len()], Some(sfx.to_string())),
        None => (s, None),
    };
    let body = if radix == 16 { body.get(2..)? } else { body };
    let digits = strip_underscores(body)?;
    let value = BigUint::parse_bytes(digits.as_bytes(), radix)?;
    Some((value, suffix))
}

fn strip_underscores(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    Some(s.replace('_', ""))
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut lex = RawToken::lexer(self.src);

        while let Some(raw) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);

            let kind = match raw {
                Ok(RawToken::KwModule) => TokenKind::KwModule,
                Ok(RawToken::KwUse) => TokenKind::KwUse,
                Ok(RawToken::KwPublic) => TokenKind::KwPublic,
                Ok(RawToken::KwEntry) => TokenKind::KwEntry,
                Ok(RawToken::KwNative) => TokenKind::KwNative,
                Ok(RawToken::KwFun) => TokenKind::KwFun,
                Ok(RawToken::KwStruct) => TokenKind::KwStruct,
                Ok(RawToken::KwHas) => TokenKind::KwHas,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwMut) => TokenKind::KwMut,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwAbort) => TokenKind::KwAbort,
                Ok(RawToken::KwAs) => TokenKind::KwAs,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwLoop) => TokenKind::KwLoop,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,

                Ok(RawToken::ColonColon) => TokenKind::ColonColon,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Dot) => TokenKind::Dot,

                Ok(RawToken::Implies) => TokenKind::Implies,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Gt) => TokenKind::Gt,
                Ok(RawToken::Eq) => TokenKind::Eq,

                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::Hash) => TokenKind::Hash,

                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::Percent) => TokenKind::Percent,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Int(Some((value, suffix)))) => TokenKind::Int { value, suffix },
                Ok(RawToken::Int(None)) => {
                    return Err(LexError {
                        message: "invalid integer literal".to_string(),
                        span,
                    });
                }

                Err(_) => {
                    return Err(LexError {
                        message: "unexpected token".to_string(),
                        span,
                    });
                }
            };

            tokens.push(Token { kind, span });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(self.src.len(), self.src.len()),
        });

        Ok(tokens)
    }
}
