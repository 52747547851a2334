use std::path::Path;
use std::process::{Command, Output};

const POOL: &str = r#"
module amm::pool {
    use prover::prover::{requires, ensures, old};

    public struct Pool has key {
        balance: u64,
        shares: u64,
    }

    public fun withdraw(pool: &mut Pool, shares_in: u64): u64 {
        let amount = (((shares_in as u128) * (pool.balance as u128) / (pool.shares as u128)) as u64);
        pool.balance = pool.balance - amount;
        pool.shares = pool.shares - shares_in;
        amount
    }

    #[spec(prove)]
    fun withdraw_spec(pool: &mut Pool, shares_in: u64): u64 {
        requires(pool.balance == 100);
        requires(pool.shares == 100);
        requires(shares_in == 50);
        let old_pool = old!(pool);
        let amount = withdraw(pool, shares_in);
        ensures(amount == 50);
        ensures(pool.balance == old_pool.balance - amount);
        amount
    }
}
"#;

const BROKEN: &str = r#"
module amm::pool {
    use prover::prover::{requires, ensures};

    public fun half(x: u64): u64 {
        x / 2
    }

    #[spec(prove)]
    fun half_spec(x: u64): u64 {
        requires(x == 10);
        let r = half(x);
        ensures(r == 6);
        r
    }
}
"#;

fn prova(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_prova"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("run prova")
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write source");
    path.to_str().expect("utf-8 path").to_string()
}

#[test]
fn prove_reports_success_and_writes_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "pool.prova", POOL);
    let out = dir.path().join("out").join("report.json");

    let o = prova(
        &["prove", &file, "--backend", "bounded", "--report", out.to_str().unwrap()],
        dir.path(),
    );
    let stdout = String::from_utf8_lossy(&o.stdout);
    assert!(o.status.success(), "stdout: {stdout}\nstderr: {}", String::from_utf8_lossy(&o.stderr));
    assert!(stdout.contains("amm::pool::withdraw_spec [PROVED]"), "{stdout}");

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["backend"], "bounded");
    assert_eq!(json["specs"][0]["verdict"], "verified");
}

#[test]
fn prove_fails_with_a_counterexample() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "half.prova", BROKEN);

    let o = prova(&["prove", &file], dir.path());
    let stdout = String::from_utf8_lossy(&o.stdout);
    assert!(!o.status.success());
    assert!(stdout.contains("half_spec [FAILED (1 disproved)]"), "{stdout}");
    assert!(stdout.contains("counterexample:"), "{stdout}");
    assert!(stdout.contains("x = 10"), "{stdout}");
}

#[test]
fn manifest_selects_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Prova.toml"), "[prover]\nbackend = \"smtlib\"\nsolver = \"/nonexistent/z3\"\n").unwrap();
    let file = write(dir.path(), "pool.prova", POOL);

    // A missing solver leaves every obligation inconclusive instead of aborting the run.
    let o = prova(&["prove", &file], dir.path());
    let stdout = String::from_utf8_lossy(&o.stdout);
    assert!(!o.status.success());
    assert!(stdout.contains("[INCONCLUSIVE"), "{stdout}");
    assert!(stdout.contains("backend smtlib"), "{stdout}");

    // Command-line flags win over the manifest.
    let o = prova(&["prove", &file, "--backend", "bounded"], dir.path());
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stdout));
}

#[test]
fn check_prints_smtlib_queries() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "pool.prova", POOL);

    let o = prova(&["check", &file], dir.path());
    let stdout = String::from_utf8_lossy(&o.stdout);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert!(stdout.contains("spec amm::pool::withdraw_spec (target withdraw"), "{stdout}");
    assert!(stdout.contains("(set-logic ALL)"));
    assert!(stdout.contains("(check-sat)"));
    assert!(stdout.contains("; #"));
}

#[test]
fn erase_drops_spec_code() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "pool.prova", POOL);

    let o = prova(&["erase", &file], dir.path());
    let stdout = String::from_utf8_lossy(&o.stdout);
    assert!(o.status.success());
    assert!(stdout.contains("fun withdraw("));
    assert!(!stdout.contains("withdraw_spec"));
    assert!(!stdout.contains("prover"));
}

#[test]
fn parse_errors_render_against_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "bad.prova", "module amm::pool {\n    fun f( {}\n}\n");

    let o = prova(&["check", &file], dir.path());
    let stderr = String::from_utf8_lossy(&o.stderr);
    assert!(!o.status.success());
    assert!(stderr.contains("parse error"), "{stderr}");
    assert!(stderr.contains("bad.prova"), "{stderr}");
}
