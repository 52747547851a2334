#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use prova_ast::{Ident, UseDecl};

/// Built-in operations of the specification layer, recognized by resolved path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Requires,
    Ensures,
    Asserts,
    Old,
    DeclareGlobal,
    Global,
    GhostSet,
    EmitEvent,
}

impl Intrinsic {
    pub fn from_path(full: &str) -> Option<Self> {
        Some(match full {
            "prover::prover::requires" => Intrinsic::Requires,
            "prover::prover::ensures" => Intrinsic::Ensures,
            "prover::prover::asserts" => Intrinsic::Asserts,
            "prover::prover::old" => Intrinsic::Old,
            "prover::ghost::declare_global" => Intrinsic::DeclareGlobal,
            "prover::ghost::global" => Intrinsic::Global,
            "prover::ghost::set" => Intrinsic::GhostSet,
            "sui::event::emit" => Intrinsic::EmitEvent,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Requires => "requires",
            Intrinsic::Ensures => "ensures",
            Intrinsic::Asserts => "asserts",
            Intrinsic::Old => "old!",
            Intrinsic::DeclareGlobal => "declare_global",
            Intrinsic::Global => "global",
            Intrinsic::GhostSet => "ghost::set",
            Intrinsic::EmitEvent => "event::emit",
        }
    }

    /// Intrinsics that may only appear in spec code. `ghost::set` and event emission
    /// live in runtime code and are erased or ignored there.
    pub fn is_spec_only(self) -> bool {
        !matches!(self, Intrinsic::GhostSet | Intrinsic::EmitEvent)
    }
}

/// Name resolution scope built from `use` declarations.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    aliases: BTreeMap<String, String>,
}

impl Scope {
    pub fn add_use(&mut self, u: &UseDecl) {
        let base = u.path.iter().map(|p| p.node.as_str()).collect::<Vec<_>>().join("::");
        match &u.members {
            None => {
                let local = u
                    .alias
                    .as_ref()
                    .or(u.path.last())
                    .map(|i| i.node.clone())
                    .unwrap_or_default();
                self.aliases.insert(local, base);
            }
            Some(members) => {
                for m in members {
                    if m.name.node == "Self" {
                        let local = m
                            .alias
                            .as_ref()
                            .or(u.path.last())
                            .map(|i| i.node.clone())
                            .unwrap_or_default();
                        self.aliases.insert(local, base.clone());
                    } else {
                        let local = m.alias.as_ref().unwrap_or(&m.name).node.clone();
                        self.aliases.insert(local, format!("{base}::{}", m.name.node));
                    }
                }
            }
        }
    }

    /// Expand the first segment through the alias table.
    pub fn resolve(&self, path: &[Ident]) -> String {
        let mut segs: Vec<String> = path.iter().map(|p| p.node.clone()).collect();
        if let Some(first) = segs.first_mut() {
            if let Some(full) = self.aliases.get(first.as_str()) {
                *first = full.clone();
            }
        }
        segs.join("::")
    }

    pub fn resolve_name(&self, name: &str) -> String {
        self.aliases.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    pub fn intrinsic(&self, path: &[Ident]) -> Option<Intrinsic> {
        Intrinsic::from_path(&self.resolve(path))
    }

    pub fn is_prover_import(u: &UseDecl) -> bool {
        u.path.first().is_some_and(|p| p.node == "prover")
    }
}
