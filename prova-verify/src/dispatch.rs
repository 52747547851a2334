#![forbid(unsafe_code)]

//! Sends obligations to a backend, bounded by a job limit, and classifies each answer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ProverOptions, Query, SolverBackend, SolverVerdict};
use crate::counterexample_mapper::{Counterexample, CounterexampleMapper};
use crate::formula::Term;
use crate::vcg::{Obligation, SpecObligations, SymbolTable};

#[derive(Clone, Debug, PartialEq)]
pub enum ObligationStatus {
    Proved,
    /// Proved only because its assumptions are contradictory.
    Vacuous,
    Disproved(Counterexample),
    Inconclusive(String),
}

impl ObligationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ObligationStatus::Proved => "proved",
            ObligationStatus::Vacuous => "vacuous",
            ObligationStatus::Disproved(_) => "disproved",
            ObligationStatus::Inconclusive(_) => "inconclusive",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ObligationOutcome {
    pub obligation: Obligation,
    pub status: ObligationStatus,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct SpecOutcome {
    pub spec: String,
    pub target: String,
    pub span: prova_ast::Span,
    pub checkpoints: usize,
    pub outcomes: Vec<ObligationOutcome>,
    pub elapsed: Duration,
}

/// Satisfiability of assumption sets already checked in this run.
type VacuityCache = Arc<Mutex<HashMap<Term, bool>>>;

pub struct Dispatcher {
    backend: Arc<dyn SolverBackend>,
    timeout: Duration,
    jobs: usize,
    check_vacuity: bool,
    cache: VacuityCache,
}

impl Dispatcher {
    pub fn new(backend: Box<dyn SolverBackend>, opts: &ProverOptions) -> Self {
        Self {
            backend: Arc::from(backend),
            timeout: opts.timeout,
            jobs: opts.jobs.max(1),
            check_vacuity: opts.check_vacuity,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Discharge every obligation of every spec: one task per spec function, at most `jobs`
    /// queries in flight overall. Outcomes keep generation order.
    pub async fn discharge(&self, specs: Vec<SpecObligations>) -> Result<Vec<SpecOutcome>, BackendError> {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut set = JoinSet::new();

        let count = specs.len();
        for (si, spec) in specs.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&permits);
            let cache = Arc::clone(&self.cache);
            let timeout = self.timeout;
            let check_vacuity = self.check_vacuity;
            set.spawn(async move {
                let t0 = Instant::now();
                let mut outcomes = Vec::with_capacity(spec.obligations.len());
                for ob in &spec.obligations {
                    let _permit = permits
                        .acquire()
                        .await
                        .map_err(|e| BackendError::Protocol(e.to_string()))?;
                    let q0 = Instant::now();
                    let status =
                        discharge_one(backend.as_ref(), ob, &spec.symbols, timeout, check_vacuity, &cache).await;
                    outcomes.push(ObligationOutcome {
                        obligation: ob.clone(),
                        status,
                        elapsed: q0.elapsed(),
                    });
                }
                info!(spec = %spec.spec, obligations = outcomes.len(), "spec discharged");
                Ok::<_, BackendError>((
                    si,
                    SpecOutcome {
                        spec: spec.spec,
                        target: spec.target,
                        span: spec.span,
                        checkpoints: spec.checkpoints,
                        outcomes,
                        elapsed: t0.elapsed(),
                    },
                ))
            });
        }

        let mut slots: Vec<Option<SpecOutcome>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (si, outcome) = joined.map_err(|e| BackendError::Protocol(format!("solver task failed: {e}")))??;
            slots[si] = Some(outcome);
        }
        let results: Vec<SpecOutcome> = slots.into_iter().flatten().collect();

        info!(
            backend = self.backend.name(),
            specs = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discharged obligations"
        );
        Ok(results)
    }

    /// Run [`Dispatcher::discharge`] on a fresh multi-threaded runtime.
    pub fn discharge_blocking(&self, specs: Vec<SpecObligations>) -> Result<Vec<SpecOutcome>, BackendError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.jobs)
            .enable_all()
            .build()?;
        rt.block_on(self.discharge(specs))
    }
}

async fn ask(backend: &dyn SolverBackend, query: &Query, timeout: Duration) -> Result<SolverVerdict, BackendError> {
    match tokio::time::timeout(timeout + Duration::from_secs(2), backend.check(query, timeout)).await {
        Ok(verdict) => verdict,
        Err(_) => Ok(SolverVerdict::Unknown("timeout".to_string())),
    }
}

async fn discharge_one(
    backend: &dyn SolverBackend,
    ob: &Obligation,
    symbols: &SymbolTable,
    timeout: Duration,
    check_vacuity: bool,
    cache: &VacuityCache,
) -> ObligationStatus {
    let status = match classify(backend, ob, symbols, timeout, check_vacuity, cache).await {
        Ok(status) => status,
        Err(e) => ObligationStatus::Inconclusive(format!("{} backend failed: {e}", backend.name())),
    };
    match &status {
        ObligationStatus::Inconclusive(reason) => {
            warn!(spec = %ob.spec, id = ob.id, kind = ob.kind.label(), %reason, "obligation inconclusive");
        }
        other => {
            debug!(spec = %ob.spec, id = ob.id, kind = ob.kind.label(), status = other.label(), "discharged");
        }
    }
    status
}

async fn classify(
    backend: &dyn SolverBackend,
    ob: &Obligation,
    symbols: &SymbolTable,
    timeout: Duration,
    check_vacuity: bool,
    cache: &VacuityCache,
) -> Result<ObligationStatus, BackendError> {
    let verdict = ask(backend, &Query::new(ob.refutation()), timeout).await?;
    Ok(match verdict {
        SolverVerdict::Sat(model) => {
            let cx = CounterexampleMapper::new(symbols).map_model(&model, &ob.probes);
            ObligationStatus::Disproved(cx)
        }
        SolverVerdict::Unknown(reason) => ObligationStatus::Inconclusive(reason),
        SolverVerdict::Unsat if !check_vacuity => ObligationStatus::Proved,
        SolverVerdict::Unsat => {
            if assumptions_satisfiable(backend, ob, timeout, cache).await? {
                ObligationStatus::Proved
            } else {
                ObligationStatus::Vacuous
            }
        }
    })
}

/// Whether some input satisfies the obligation's assumptions. An inconclusive answer counts
/// as satisfiable so that a proof is never downgraded on a guess.
async fn assumptions_satisfiable(
    backend: &dyn SolverBackend,
    ob: &Obligation,
    timeout: Duration,
    cache: &VacuityCache,
) -> Result<bool, BackendError> {
    let key = Term::and(ob.assumptions.iter().cloned());
    if let Some(hit) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key).copied() {
        return Ok(hit);
    }
    let sat = match ask(backend, &Query::new(ob.assumptions.clone()), timeout).await? {
        SolverVerdict::Unsat => false,
        SolverVerdict::Sat(_) => true,
        SolverVerdict::Unknown(reason) => {
            warn!(spec = %ob.spec, id = ob.id, %reason, "vacuity check inconclusive");
            true
        }
    };
    cache.lock().unwrap_or_else(|e| e.into_inner()).insert(key, sat);
    Ok(sat)
}
