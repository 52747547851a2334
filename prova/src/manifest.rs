#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use prova_verify::{BackendKind, ProverOptions};
use thiserror::Error;

pub const MANIFEST_NAME: &str = "Prova.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(prova::manifest))]
pub struct ManifestError {
    pub message: String,
}

/// Prover settings read from `Prova.toml`. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProverSection {
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub solver: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub max_assignments: Option<u64>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Manifest {
    #[serde(default)]
    prover: ProverSection,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub prover: ProverSection,
}

impl ResolvedManifest {
    /// Layer the manifest over the built-in defaults.
    pub fn prover_options(&self) -> ProverOptions {
        let mut opts = ProverOptions::default();
        let p = &self.prover;
        if let Some(b) = p.backend {
            opts.backend = b;
        }
        if let Some(s) = &p.solver {
            opts.solver = s.clone();
        }
        if let Some(ms) = p.timeout_ms {
            opts.timeout = Duration::from_millis(ms);
        }
        if let Some(j) = p.jobs {
            opts.jobs = j.max(1);
        }
        if let Some(n) = p.max_assignments {
            opts.max_assignments = n;
        }
        opts
    }
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        let parent = cur.parent().map(|p| p.to_path_buf());
        match parent {
            Some(p) => cur = p,
            None => return None,
        }
    }
}

pub fn load_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let Some(manifest_path) = find_manifest(start) else {
        return Ok(ResolvedManifest::default());
    };

    let text = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;
    let manifest: Manifest = toml::from_str(&text).map_err(|e| ManifestError {
        message: format!("failed to parse {}: {e}", manifest_path.display()),
    })?;
    if manifest.prover.jobs == Some(0) {
        return Err(ManifestError {
            message: format!("{}: `prover.jobs` must be at least 1", manifest_path.display()),
        });
    }

    tracing::debug!(path = %manifest_path.display(), "loaded manifest");
    Ok(ResolvedManifest {
        manifest_path: Some(manifest_path),
        prover: manifest.prover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pool.prova");
        fs::write(&file, "module a::b {}").unwrap();
        let m = load_manifest(&file).unwrap();
        assert!(m.manifest_path.is_none());
        assert_eq!(m.prover_options().backend, BackendKind::Bounded);
    }

    #[test]
    fn manifest_is_found_in_a_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_NAME),
            "[prover]\nbackend = \"smtlib\"\nsolver = \"/opt/z3\"\ntimeout_ms = 250\njobs = 2\nmax_assignments = 99\n",
        )
        .unwrap();
        let nested = dir.path().join("src").join("amm");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("pool.prova");
        fs::write(&file, "").unwrap();

        let m = load_manifest(&file).unwrap();
        assert_eq!(m.manifest_path.as_deref(), Some(dir.path().join(MANIFEST_NAME).as_path()));
        let opts = m.prover_options();
        assert_eq!(opts.backend, BackendKind::Smtlib);
        assert_eq!(opts.solver, "/opt/z3");
        assert_eq!(opts.timeout, Duration::from_millis(250));
        assert_eq!(opts.jobs, 2);
        assert_eq!(opts.max_assignments, 99);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_NAME);

        fs::write(&path, "[prover]\nbackend = \"cvc5\"\n").unwrap();
        assert!(load_manifest(dir.path()).unwrap_err().message.contains("failed to parse"));

        fs::write(&path, "[prover]\nthreads = 3\n").unwrap();
        assert!(load_manifest(dir.path()).is_err());

        fs::write(&path, "[prover]\njobs = 0\n").unwrap();
        assert!(load_manifest(dir.path()).unwrap_err().message.contains("at least 1"));
    }

    #[test]
    fn empty_manifest_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), "").unwrap();
        let m = load_manifest(dir.path()).unwrap();
        assert!(m.manifest_path.is_some());
        assert_eq!(m.prover, ProverSection::default());
    }
}
