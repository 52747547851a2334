//! End-to-end runs against an external SMT-LIB solver. Skipped unless `Z3_EXE` is set.

mod common;

use std::time::Duration;

use common::{prove, spec, vault, POOL};
use prova_verify::{BackendKind, ProverOptions, SpecVerdict};

fn solver_options() -> Option<ProverOptions> {
    let exe = std::env::var("Z3_EXE").ok().filter(|s| !s.is_empty());
    let Some(exe) = exe else {
        tracing::warn!("skipping smtlib test: Z3_EXE not set");
        return None;
    };
    Some(ProverOptions {
        backend: BackendKind::Smtlib,
        solver: exe,
        timeout: Duration::from_secs(10),
        ..ProverOptions::default()
    })
}

#[test]
fn pool_scenarios() {
    let Some(opts) = solver_options() else { return };
    let report = prove(POOL, &opts);
    assert_eq!(spec(&report, "withdraw_spec").verdict, SpecVerdict::Verified);

    let bad = spec(&report, "withdraw_off_by_one_spec");
    assert_eq!(bad.verdict, SpecVerdict::Failed);
    let cx = bad.obligations.iter().find_map(|o| o.counterexample.as_ref()).unwrap();
    assert_eq!(cx.inputs["shares_in"].display_compact(), "50");
}

#[test]
fn unbounded_inputs_are_decided() {
    let Some(opts) = solver_options() else { return };
    let report = prove(
        r#"
        module m::wide {
            use prover::prover::ensures;
            fun inc(x: u64): u64 { x + 1 }
            #[spec(prove, ignore_abort)]
            fun inc_spec(x: u64): u64 {
                let r = inc(x);
                ensures(r > x);
                r
            }
        }
        "#,
        &opts,
    );
    assert_eq!(spec(&report, "inc_spec").verdict, SpecVerdict::Verified);
}

#[test]
fn ghost_threshold() {
    let Some(opts) = solver_options() else { return };
    assert_eq!(
        spec(&prove(&vault(9999, ">="), &opts), "withdraw_spec").verdict,
        SpecVerdict::VerifiedVacuous
    );
    assert_eq!(
        spec(&prove(&vault(10000, ">"), &opts), "withdraw_spec").verdict,
        SpecVerdict::Failed
    );
}
