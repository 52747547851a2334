#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use prova_ast::Span;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("semantic error: {message}")]
#[diagnostic(code(prova::sema))]
#[allow(unused_assignments)]
pub struct SemanticError {
    pub message: String,
    #[label]
    pub span: Span,
}

impl SemanticError {
    pub(crate) fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}
