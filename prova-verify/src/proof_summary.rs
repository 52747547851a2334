/// Proof summaries: per-obligation results rolled up into a verdict per spec function and a
/// report per module.
///
/// Human output is one line per spec function:
/// `amm::pool::withdraw_spec [PROVED] - 4 obligation(s) - 12ms`
use std::time::Duration;

use serde::Serialize;

use crate::counterexample_mapper::Counterexample;
use crate::dispatch::{ObligationStatus, SpecOutcome};
use crate::vcg::ObligationKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<prova_ast::Span> for SpanRange {
    fn from(span: prova_ast::Span) -> Self {
        SpanRange {
            offset: span.offset(),
            len: span.len(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ObligationReport {
    pub id: usize,
    pub kind: ObligationKind,
    pub description: String,
    pub span: SpanRange,
    /// `proved`, `vacuous`, `disproved` or `inconclusive`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Counterexample>,
    pub elapsed_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecVerdict {
    Verified,
    VerifiedVacuous,
    Failed,
    Inconclusive,
    /// A `#[spec]` function without `prove`.
    Skipped,
}

impl SpecVerdict {
    pub fn label(self) -> &'static str {
        match self {
            SpecVerdict::Verified => "verified",
            SpecVerdict::VerifiedVacuous => "verified (vacuous obligations)",
            SpecVerdict::Failed => "failed",
            SpecVerdict::Inconclusive => "inconclusive",
            SpecVerdict::Skipped => "skipped",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            SpecVerdict::Verified => "PROVED",
            SpecVerdict::VerifiedVacuous => "VACUOUS",
            SpecVerdict::Failed => "FAILED",
            SpecVerdict::Inconclusive => "INCONCLUSIVE",
            SpecVerdict::Skipped => "SKIPPED",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SpecReport {
    pub name: String,
    pub target: String,
    pub verdict: SpecVerdict,
    pub obligations: Vec<ObligationReport>,
    pub checkpoints: usize,
    pub elapsed_ms: u64,
}

impl SpecReport {
    pub fn from_outcome(outcome: SpecOutcome) -> Self {
        let mut any_failed = false;
        let mut any_inconclusive = false;
        let mut any_vacuous = false;
        let obligations = outcome
            .outcomes
            .into_iter()
            .map(|o| {
                let (reason, counterexample) = match o.status.clone() {
                    ObligationStatus::Disproved(cx) => {
                        any_failed = true;
                        (None, Some(cx))
                    }
                    ObligationStatus::Inconclusive(r) => {
                        any_inconclusive = true;
                        (Some(r), None)
                    }
                    ObligationStatus::Vacuous => {
                        any_vacuous = true;
                        (Some("unreachable precondition".to_string()), None)
                    }
                    ObligationStatus::Proved => (None, None),
                };
                ObligationReport {
                    id: o.obligation.id,
                    kind: o.obligation.kind,
                    description: o.obligation.description,
                    span: o.obligation.span.into(),
                    status: o.status.label(),
                    reason,
                    counterexample,
                    elapsed_ms: millis(o.elapsed),
                }
            })
            .collect();

        let verdict = if any_failed {
            SpecVerdict::Failed
        } else if any_inconclusive {
            SpecVerdict::Inconclusive
        } else if any_vacuous {
            SpecVerdict::VerifiedVacuous
        } else {
            SpecVerdict::Verified
        };
        SpecReport {
            name: outcome.spec,
            target: outcome.target,
            verdict,
            obligations,
            checkpoints: outcome.checkpoints,
            elapsed_ms: millis(outcome.elapsed),
        }
    }

    pub fn skipped(name: String, target: String) -> Self {
        SpecReport {
            name,
            target,
            verdict: SpecVerdict::Skipped,
            obligations: Vec::new(),
            checkpoints: 0,
            elapsed_ms: 0,
        }
    }

    /// Render as a single human-readable line.
    pub fn format_summary(&self) -> String {
        let detail = match self.verdict {
            SpecVerdict::Failed => {
                let n = self.count("disproved");
                format!(" ({n} disproved)")
            }
            SpecVerdict::Inconclusive => {
                let n = self.count("inconclusive");
                format!(" ({n} inconclusive)")
            }
            SpecVerdict::VerifiedVacuous => {
                let n = self.count("vacuous");
                format!(" ({n} vacuous)")
            }
            _ => String::new(),
        };
        format!(
            "{} [{}{}] - {} obligation(s) - {}ms",
            self.name,
            self.verdict.tag(),
            detail,
            self.obligations.len(),
            self.elapsed_ms
        )
    }

    pub fn count(&self, status: &str) -> usize {
        self.obligations.iter().filter(|o| o.status == status).count()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub backend: String,
    pub specs: Vec<SpecReport>,
    pub elapsed_ms: u64,
}

impl ModuleReport {
    /// No obligation was disproved or left inconclusive.
    pub fn is_success(&self) -> bool {
        self.specs
            .iter()
            .all(|s| !matches!(s.verdict, SpecVerdict::Failed | SpecVerdict::Inconclusive))
    }

    pub fn spec(&self, name: &str) -> Option<&SpecReport> {
        self.specs
            .iter()
            .find(|s| s.name == name || s.name.rsplit("::").next() == Some(name))
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.specs.iter().map(SpecReport::format_summary).collect()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ObligationOutcome;
    use crate::formula::Term;
    use crate::vcg::Obligation;

    fn outcome(statuses: Vec<ObligationStatus>) -> SpecOutcome {
        SpecOutcome {
            spec: "amm::pool::withdraw_spec".into(),
            target: "withdraw".into(),
            span: prova_ast::span(0, 4),
            checkpoints: 1,
            outcomes: statuses
                .into_iter()
                .enumerate()
                .map(|(id, status)| ObligationOutcome {
                    obligation: Obligation {
                        id,
                        spec: "amm::pool::withdraw_spec".into(),
                        kind: ObligationKind::Ensures,
                        description: "ensures(r == 50)".into(),
                        span: prova_ast::span(10, 16),
                        assumptions: Vec::new(),
                        goal: Term::Bool(true),
                        probes: Vec::new(),
                    },
                    status,
                    elapsed: Duration::from_millis(3),
                })
                .collect(),
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn summary_line_format() {
        let r = SpecReport::from_outcome(outcome(vec![ObligationStatus::Proved; 4]));
        assert_eq!(r.verdict, SpecVerdict::Verified);
        assert_eq!(r.format_summary(), "amm::pool::withdraw_spec [PROVED] - 4 obligation(s) - 12ms");
    }

    #[test]
    fn verdict_precedence() {
        let r = SpecReport::from_outcome(outcome(vec![
            ObligationStatus::Vacuous,
            ObligationStatus::Inconclusive("timeout".into()),
            ObligationStatus::Disproved(Counterexample::default()),
        ]));
        assert_eq!(r.verdict, SpecVerdict::Failed);
        assert!(r.format_summary().contains("[FAILED (1 disproved)]"));

        let r = SpecReport::from_outcome(outcome(vec![ObligationStatus::Proved, ObligationStatus::Vacuous]));
        assert_eq!(r.verdict, SpecVerdict::VerifiedVacuous);
        assert_eq!(r.obligations[1].reason.as_deref(), Some("unreachable precondition"));

        let module = ModuleReport {
            module: "amm::pool".into(),
            backend: "bounded".into(),
            specs: vec![r, SpecReport::skipped("amm::pool::helper_spec".into(), "helper".into())],
            elapsed_ms: 12,
        };
        assert!(module.is_success());
        assert!(module.spec("helper_spec").is_some());
    }

    #[test]
    fn json_shape() {
        let r = SpecReport::from_outcome(outcome(vec![ObligationStatus::Proved]));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["verdict"], "verified");
        assert_eq!(json["obligations"][0]["kind"], "ensures");
        assert_eq!(json["obligations"][0]["span"]["offset"], 10);
        assert!(json["obligations"][0].get("counterexample").is_none());
    }
}
