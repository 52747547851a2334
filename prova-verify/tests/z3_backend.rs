#![cfg(feature = "z3")]

mod common;

use common::{prove, spec, POOL};
use prova_verify::{BackendKind, ProverOptions, SpecVerdict};

fn z3() -> ProverOptions {
    ProverOptions {
        backend: BackendKind::Z3,
        ..ProverOptions::default()
    }
}

#[test]
fn pool_scenarios_in_process() {
    let report = prove(POOL, &z3());
    assert_eq!(report.backend, "z3");
    assert_eq!(spec(&report, "withdraw_spec").verdict, SpecVerdict::Verified);
    assert_eq!(spec(&report, "withdraw_off_by_one_spec").verdict, SpecVerdict::Failed);
}

#[test]
fn integer_ratio_holds_for_all_inputs() {
    let report = prove(
        r#"
        module m::ratio {
            use prover::prover::{requires, ensures};
            fun half(x: u64): u64 { x / 2 }
            #[spec(prove)]
            fun half_spec(x: u64): u64 {
                let r = half(x);
                ensures(r.to_int().mul(2).lte(x.to_int()));
                ensures(x.to_int().sub(r.to_int().mul(2)).lt(2));
                r
            }
        }
        "#,
        &z3(),
    );
    assert_eq!(spec(&report, "half_spec").verdict, SpecVerdict::Verified);
}
