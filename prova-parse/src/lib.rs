#![forbid(unsafe_code)]

mod error;
mod fmt;
mod parser;

use miette::IntoDiagnostic;
use prova_lex::Lexer;

pub use error::ParseError;
pub use fmt::{format_expr, format_module, format_program, format_type};
pub use parser::Parser;

pub fn parse_source(src: &str) -> miette::Result<prova_ast::Program> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_program().into_diagnostic()
}

/// Parse a source file that must contain exactly one module.
pub fn parse_module(src: &str) -> miette::Result<prova_ast::Module> {
    let mut program = parse_source(src)?;
    if program.modules.len() != 1 {
        let span = program
            .modules
            .get(1)
            .map(|m| m.span)
            .unwrap_or_else(|| prova_ast::span_between(0, 0));
        return Err(ParseError {
            message: format!("expected exactly one module, found {}", program.modules.len()),
            span,
        })
        .into_diagnostic();
    }
    Ok(program.modules.remove(0))
}

pub fn parse_expr(src: &str) -> miette::Result<prova_ast::Expr> {
    let tokens = Lexer::new(src).lex().into_diagnostic()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_expr_eof().into_diagnostic()
}
