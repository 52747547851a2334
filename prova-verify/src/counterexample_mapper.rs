// Counterexample Mapper: solver model → source-level values
//
// Solver variables are flattened struct leaves (`pool.balance`). The mapper regroups them
// under their root parameter using the symbol table recorded during obligation generation,
// so a counterexample reads like the spec's own inputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::formula::{Assignment, Value};
use crate::vcg::{Probe, SymbolOrigin, SymbolTable};

/// A typed value extracted from a solver model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypedValue {
    /// Integer or boolean leaf
    Primitive { typ: String, value: String },
    /// Struct with named fields
    Record {
        name: String,
        fields: BTreeMap<String, TypedValue>,
    },
    /// The solver did not assign this leaf
    Unknown { reason: String },
}

impl TypedValue {
    /// Multi-line rendering for terminal output
    pub fn display(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        match self {
            TypedValue::Primitive { value, .. } => format!("{pad}{value}"),
            TypedValue::Record { name, fields } => {
                let mut result = format!("{pad}{name} {{\n");
                for (fname, fval) in fields {
                    let inner = fval.display(indent + 2);
                    result.push_str(&format!("{pad}  {fname}: {},\n", inner.trim_start()));
                }
                result.push_str(&format!("{pad}}}"));
                result
            }
            TypedValue::Unknown { reason } => format!("{pad}<{reason}>"),
        }
    }

    /// Single-line representation
    pub fn display_compact(&self) -> String {
        match self {
            TypedValue::Primitive { value, .. } => value.clone(),
            TypedValue::Record { name, fields } => {
                let body = fields
                    .iter()
                    .map(|(n, v)| format!("{n}: {}", v.display_compact()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{name} {{ {body} }}")
            }
            TypedValue::Unknown { reason } => format!("<{reason}>"),
        }
    }

    fn insert(&mut self, path: &[String], owners: &[String], leaf: TypedValue) {
        let Some((head, rest)) = path.split_first() else {
            *self = leaf;
            return;
        };
        if !matches!(self, TypedValue::Record { .. }) {
            *self = TypedValue::Record {
                name: owners.first().cloned().unwrap_or_default(),
                fields: BTreeMap::new(),
            };
        }
        if let TypedValue::Record { fields, .. } = self {
            let child = fields.entry(head.clone()).or_insert(TypedValue::Unknown {
                reason: "unassigned".to_string(),
            });
            child.insert(rest, owners.get(1..).unwrap_or_default(), leaf);
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeValue {
    pub name: String,
    pub value: String,
}

/// Values that make an obligation fail.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Counterexample {
    /// Spec function parameters.
    pub inputs: BTreeMap<String, TypedValue>,
    /// Results chosen for native calls.
    pub native: BTreeMap<String, TypedValue>,
    /// Source-named intermediate values at the failing point.
    pub probes: Vec<ProbeValue>,
}

impl Counterexample {
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, v) in self.inputs.iter().chain(&self.native) {
            out.push(format!("{name} = {}", v.display_compact()));
        }
        for p in &self.probes {
            out.push(format!("{} = {}", p.name, p.value));
        }
        out
    }
}

/// Maps solver assignments to source-level values.
pub struct CounterexampleMapper<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> CounterexampleMapper<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        CounterexampleMapper { symbols }
    }

    fn leaf(ty: &str, value: Option<&Value>) -> TypedValue {
        match value {
            Some(v) => TypedValue::Primitive {
                typ: ty.to_string(),
                value: v.to_string(),
            },
            None => TypedValue::Unknown {
                reason: "unassigned".to_string(),
            },
        }
    }

    /// Regroup the model's leaves by root and evaluate `probes` under it.
    pub fn map_model(&self, model: &Assignment, probes: &[Probe]) -> Counterexample {
        let mut cx = Counterexample::default();
        for (var, info) in self.symbols.iter() {
            let target = match info.origin {
                SymbolOrigin::Param => &mut cx.inputs,
                SymbolOrigin::NativeResult { .. } | SymbolOrigin::Havoc { .. } => &mut cx.native,
            };
            let leaf = Self::leaf(&info.ty, model.get(var));
            let root = target.entry(info.root.clone()).or_insert(TypedValue::Unknown {
                reason: "unassigned".to_string(),
            });
            root.insert(&info.path, &info.owners, leaf);
        }
        cx.probes = probes
            .iter()
            .map(|p| ProbeValue {
                name: p.name.clone(),
                value: p.term.eval(model).to_string(),
            })
            .collect();
        cx
    }
}
