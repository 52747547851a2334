#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use prova_ast::Span;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(prova::parse))]
#[allow(unused_assignments)]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
}
