#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use prova_ast::Span;
use thiserror::Error;

/// A specification error found while generating obligations. Reported before any solver runs.
#[derive(Debug, Error, Diagnostic)]
#[error("verification error: {message}")]
#[diagnostic(code(prova::verify))]
#[allow(unused_assignments)]
pub struct VerifyError {
    pub message: String,
    #[label]
    pub span: Span,
    #[help]
    pub help: Option<String>,
}

impl VerifyError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}
