#![forbid(unsafe_code)]

use num::BigUint;
use prova_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwModule,
    KwUse,
    KwPublic,
    KwEntry,
    KwNative,
    KwFun,
    KwStruct,
    KwHas,
    KwConst,
    KwLet,
    KwMut,
    KwIf,
    KwElse,
    KwAbort,
    KwAs,
    KwTrue,
    KwFalse,
    // Reserved so the parser can reject them with a useful message.
    KwWhile,
    KwLoop,
    KwReturn,

    // Operators / punctuation
    ColonColon,
    Colon,
    Semi,
    Comma,
    Dot,
    Eq,
    EqEq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    Implies,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    AndAnd,
    OrOr,
    Bang,
    Amp,
    Hash,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,

    // Literals / identifiers
    Ident(String),
    Int { value: BigUint, suffix: Option<String> },
}
