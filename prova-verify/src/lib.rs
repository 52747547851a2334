#![forbid(unsafe_code)]

pub mod backend;
pub mod counterexample_mapper;
pub mod dispatch;
mod error;
pub mod formula;
pub mod ghost;
pub mod proof_summary;
pub mod snapshot;
pub mod unbounded;
pub mod value;
pub mod vcg;

use std::time::Instant;

use miette::Diagnostic;
use prova_ast::Module;
use prova_core::{build_model, SemanticError, SpecModel};
use thiserror::Error;
use tracing::info;

pub use backend::{make_backend, BackendError, BackendKind, ProverOptions, Query, SolverBackend, SolverVerdict};
pub use counterexample_mapper::{Counterexample, CounterexampleMapper, TypedValue};
pub use dispatch::{Dispatcher, ObligationOutcome, ObligationStatus, SpecOutcome};
pub use error::VerifyError;
pub use proof_summary::{ModuleReport, ObligationReport, SpecReport, SpecVerdict};
pub use vcg::{generate_for_spec, generate_obligations, Obligation, ObligationKind, SpecObligations};

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    #[diagnostic(code(prova::backend))]
    Backend(#[from] BackendError),
}

/// Whether `filter` selects the spec function `name` (or its target).
fn selected(filter: Option<&str>, name: &str, target: &str) -> bool {
    filter.is_none_or(|f| name.contains(f) || target == f)
}

/// Build the model, generate every obligation, then discharge them.
pub fn verify_module(module: &Module, opts: &ProverOptions) -> Result<ModuleReport, PipelineError> {
    let model = build_model(module)?;
    verify_model(&model, opts, None)
}

pub fn verify_model(model: &SpecModel, opts: &ProverOptions, filter: Option<&str>) -> Result<ModuleReport, PipelineError> {
    let started = Instant::now();
    let mut generated = generate_obligations(model)?;
    generated.retain(|s| {
        let short = s.spec.rsplit("::").next().unwrap_or(&s.spec);
        selected(filter, short, &s.target)
    });

    let dispatcher = Dispatcher::new(make_backend(opts)?, opts);
    let mut outcomes = dispatcher.discharge_blocking(generated)?.into_iter();

    let module = model.qualified_name();
    let mut specs = Vec::new();
    for s in &model.specs {
        if !selected(filter, &s.name, &s.target) {
            continue;
        }
        if s.verify {
            if let Some(outcome) = outcomes.next() {
                specs.push(SpecReport::from_outcome(outcome));
            }
        } else {
            specs.push(SpecReport::skipped(format!("{module}::{}", s.name), s.target.clone()));
        }
    }

    let report = ModuleReport {
        module,
        backend: dispatcher.backend_name().to_string(),
        specs,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    info!(module = %report.module, success = report.is_success(), "verification finished");
    Ok(report)
}
