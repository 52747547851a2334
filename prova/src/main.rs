#![forbid(unsafe_code)]

mod manifest;
mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, NamedSource};
use prova_ast::Module;
use prova_lex::Lexer;
use prova_parse::ParseError;
use prova_verify::{BackendKind, ProverOptions, Query};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prova", version, about = "Specification checker for Move-like modules")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate every obligation and discharge it with a solver backend.
    Prove {
        /// Source file containing one module.
        path: PathBuf,

        /// Solver backend (bounded | smtlib | z3). Overrides `Prova.toml`.
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Solver executable for the smtlib backend. Overrides `Prova.toml` and `$Z3_EXE`.
        #[arg(long)]
        solver: Option<String>,

        /// Per-query timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Maximum number of solver queries in flight.
        #[arg(long)]
        jobs: Option<usize>,

        /// Only prove spec functions whose name contains NAME, or that target the function NAME.
        #[arg(long, value_name = "NAME")]
        filter: Option<String>,

        /// Write a JSON report to this path.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Skip the satisfiability check of the assumptions of proved obligations.
        #[arg(long, default_value_t = false)]
        no_vacuity: bool,
    },

    /// Build the spec model and print each obligation as SMT-LIB without solving it.
    Check {
        path: PathBuf,

        /// Print the implication form instead of the full refutation query.
        #[arg(long, default_value_t = false)]
        formula_only: bool,
    },

    /// Print the module with every spec-only item removed.
    Erase { path: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Prove {
            path,
            backend,
            solver,
            timeout_ms,
            jobs,
            filter,
            report: report_path,
            no_vacuity,
        } => {
            let resolved = manifest::load_manifest(&path)?;
            if let Some(m) = &resolved.manifest_path {
                debug!(manifest = %m.display(), "using manifest");
            }
            let mut opts = resolved.prover_options();
            apply_overrides(&mut opts, backend, solver, timeout_ms, jobs);
            opts.check_vacuity = !no_vacuity;

            let (src, source, module) = load_module(&path)?;
            let model = prova_core::build_model(&module)
                .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;
            let result = prova_verify::verify_model(&model, &opts, filter.as_deref())
                .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;

            if result.specs.is_empty() {
                warn!(path = %path.display(), "no spec functions selected");
            }
            for spec in &result.specs {
                for w in report::vacuity_warnings(&src, spec) {
                    eprintln!("{w}");
                }
            }
            print!("{}", report::render(&src, &result));

            if let Some(out) = report_path {
                report::write_prove_report(&path, &result, &out)?;
                println!("wrote {}", out.display());
            }

            if !result.is_success() {
                return Err(miette::miette!("verification failed for {}", report::display_path(&path)));
            }
        }
        Cmd::Check { path, formula_only } => {
            let (_, source, module) = load_module(&path)?;
            let model = prova_core::build_model(&module)
                .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;
            let generated = prova_verify::generate_obligations(&model)
                .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;

            let mut total = 0;
            for spec in &generated {
                println!("spec {} (target {}, {} checkpoint(s))", spec.spec, spec.target, spec.checkpoints);
                for ob in &spec.obligations {
                    total += 1;
                    println!("; #{} {}: {}", ob.id, ob.kind.label(), ob.description);
                    if formula_only {
                        println!("{}", ob.formula());
                    } else {
                        print!("{}", Query::new(ob.refutation()).to_smtlib());
                    }
                }
            }
            println!("{total} obligation(s) in {} spec function(s)", generated.len());
        }
        Cmd::Erase { path } => {
            let (_, _, module) = load_module(&path)?;
            print!("{}", prova_parse::format_module(&prova_core::erase_spec(&module)));
        }
    }

    Ok(())
}

fn apply_overrides(
    opts: &mut ProverOptions,
    backend: Option<BackendKind>,
    solver: Option<String>,
    timeout_ms: Option<u64>,
    jobs: Option<usize>,
) {
    if let Some(b) = backend {
        opts.backend = b;
    }
    if let Some(s) = solver {
        opts.solver = s;
    }
    if let Some(ms) = timeout_ms {
        opts.timeout = Duration::from_millis(ms);
    }
    if let Some(j) = jobs {
        opts.jobs = j.max(1);
    }
}

/// Read, lex and parse a file holding exactly one module.
fn load_module(path: &Path) -> miette::Result<(String, NamedSource<String>, Module)> {
    let src = std::fs::read_to_string(path).into_diagnostic()?;
    let source = NamedSource::new(display_path(path), src.clone());

    let tokens = Lexer::new(&src)
        .lex()
        .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;
    let mut parser = prova_parse::Parser::new(&tokens);
    let mut program = parser
        .parse_program()
        .map_err(|e| miette::Report::new(e).with_source_code(source.clone()))?;

    if program.modules.len() != 1 {
        let span = program
            .modules
            .get(1)
            .map(|m| m.span)
            .unwrap_or_else(|| prova_ast::span_between(0, 0));
        let err = ParseError {
            message: format!("expected exactly one module, found {}", program.modules.len()),
            span,
        };
        return Err(miette::Report::new(err).with_source_code(source));
    }
    let module = program.modules.remove(0);
    Ok((src, source, module))
}

fn display_path(p: &Path) -> String {
    p.to_string_lossy().to_string()
}
