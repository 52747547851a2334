#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::Path;

use miette::IntoDiagnostic;
use prova_verify::{ModuleReport, ObligationReport, SpecReport};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProveReport<'a> {
    pub schema: &'static str,
    pub input: String,
    pub ok: bool,
    #[serde(flatten)]
    pub module: &'a ModuleReport,
}

pub fn write_prove_report(input: &Path, module: &ModuleReport, out_path: &Path) -> miette::Result<()> {
    let report = ProveReport {
        schema: "prova.prove.v1",
        input: display_path(input),
        ok: module.is_success(),
        module,
    };

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
    }
    let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
    std::fs::write(out_path, json).into_diagnostic()?;
    Ok(())
}

/// 1-based line and column of a byte offset.
pub fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(src.len());
    let before = src.get(..offset).unwrap_or(src);
    let line = before.matches('\n').count() + 1;
    let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, col)
}

fn obligation_header(src: &str, ob: &ObligationReport) -> String {
    let (line, col) = line_col(src, ob.span.offset);
    format!("#{} {} at {line}:{col}: {}", ob.id, ob.kind.label(), ob.description)
}

/// Lines following a spec summary: counterexamples for disproved obligations and the
/// reason for inconclusive ones.
pub fn render_details(src: &str, spec: &SpecReport) -> Vec<String> {
    let mut out = Vec::new();
    for ob in &spec.obligations {
        match ob.status {
            "disproved" => {
                out.push(format!("  {} is disproved", obligation_header(src, ob)));
                if let Some(cx) = &ob.counterexample {
                    out.push("    counterexample:".to_string());
                    out.extend(cx.lines().into_iter().map(|l| format!("      {l}")));
                }
            }
            "inconclusive" => {
                let reason = ob.reason.as_deref().unwrap_or("unknown");
                out.push(format!("  {} is inconclusive: {reason}", obligation_header(src, ob)));
            }
            _ => {}
        }
    }
    out
}

/// Warnings for obligations that hold only because their assumptions are contradictory.
pub fn vacuity_warnings(src: &str, spec: &SpecReport) -> Vec<String> {
    spec.obligations
        .iter()
        .filter(|ob| ob.status == "vacuous")
        .map(|ob| {
            format!(
                "warning: {} {} holds vacuously (unreachable precondition)",
                spec.name,
                obligation_header(src, ob)
            )
        })
        .collect()
}

/// The full human-readable rendering of a run.
pub fn render(src: &str, module: &ModuleReport) -> String {
    let mut s = String::new();
    for spec in &module.specs {
        let _ = writeln!(s, "{}", spec.format_summary());
        for line in render_details(src, spec) {
            let _ = writeln!(s, "{line}");
        }
    }
    let failed = module
        .specs
        .iter()
        .filter(|sp| sp.verdict == prova_verify::SpecVerdict::Failed)
        .count();
    let _ = writeln!(
        s,
        "{}: {} spec function(s), {failed} failed, backend {} - {}ms",
        module.module,
        module.specs.len(),
        module.backend,
        module.elapsed_ms
    );
    s
}

pub fn display_path(path: &Path) -> String {
    // Keep output stable and mostly relative for CI artifacts.
    let p = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let s = p.to_string_lossy().replace('\\', "/");

    if let Ok(cwd) = std::env::current_dir() {
        let prefix = format!("{}/", cwd.to_string_lossy().replace('\\', "/"));
        if let Some(rest) = s.strip_prefix(&prefix) {
            return rest.to_string();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use prova_verify::proof_summary::SpanRange;
    use prova_verify::{Counterexample, ObligationKind, SpecVerdict, TypedValue};

    const SRC: &str = "module amm::pool {\n    fun withdraw() {}\n}\n";

    fn ob(id: usize, status: &'static str) -> ObligationReport {
        ObligationReport {
            id,
            kind: ObligationKind::Ensures,
            description: "result <= 20".to_string(),
            span: SpanRange { offset: 23, len: 8 },
            status,
            reason: (status == "inconclusive").then(|| "search budget exhausted".to_string()),
            counterexample: None,
            elapsed_ms: 1,
        }
    }

    fn module(specs: Vec<SpecReport>) -> ModuleReport {
        ModuleReport {
            module: "amm::pool".to_string(),
            backend: "bounded".to_string(),
            specs,
            elapsed_ms: 7,
        }
    }

    fn spec(verdict: SpecVerdict, obligations: Vec<ObligationReport>) -> SpecReport {
        SpecReport {
            name: "amm::pool::withdraw_spec".to_string(),
            target: "withdraw".to_string(),
            verdict,
            obligations,
            checkpoints: 1,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn line_and_column_are_one_based() {
        assert_eq!(line_col(SRC, 0), (1, 1));
        assert_eq!(line_col(SRC, 23), (2, 5));
        assert_eq!(line_col(SRC, 10_000).0, 4);
    }

    #[test]
    fn disproved_obligations_print_their_counterexample() {
        let mut failing = ob(2, "disproved");
        let mut cx = Counterexample::default();
        cx.inputs.insert(
            "amount".to_string(),
            TypedValue::Primitive {
                typ: "u64".to_string(),
                value: "51".to_string(),
            },
        );
        failing.counterexample = Some(cx);
        let sp = spec(SpecVerdict::Failed, vec![ob(1, "proved"), failing]);

        let lines = render_details(SRC, &sp);
        assert_eq!(lines[0], "  #2 ensures at 2:5: result <= 20 is disproved");
        assert_eq!(lines[1], "    counterexample:");
        assert_eq!(lines[2], "      amount = 51");

        let text = render(SRC, &module(vec![sp]));
        assert!(text.starts_with("amm::pool::withdraw_spec [FAILED (1 disproved)]"));
        assert!(text.contains("1 spec function(s), 1 failed, backend bounded"));
    }

    #[test]
    fn inconclusive_and_vacuous_are_reported_distinctly() {
        let sp = spec(SpecVerdict::Inconclusive, vec![ob(1, "inconclusive"), ob(2, "vacuous")]);
        let details = render_details(SRC, &sp);
        assert_eq!(details.len(), 1);
        assert!(details[0].ends_with("is inconclusive: search budget exhausted"));

        let warnings = vacuity_warnings(SRC, &sp);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("warning: amm::pool::withdraw_spec #2 ensures"));
    }

    #[test]
    fn json_report_carries_the_module_fields() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports").join("out.json");
        let m = module(vec![spec(SpecVerdict::Verified, vec![ob(1, "proved")])]);
        write_prove_report(Path::new("pool.prova"), &m, &out).unwrap();

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(v["schema"], "prova.prove.v1");
        assert_eq!(v["ok"], true);
        assert_eq!(v["module"], "amm::pool");
        assert_eq!(v["specs"][0]["verdict"], "verified");
        assert_eq!(v["specs"][0]["obligations"][0]["kind"], "ensures");
    }
}
