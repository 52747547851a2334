#![forbid(unsafe_code)]

//! Obligation generation.
//!
//! A spec function body is folded statement by statement over an explicit accumulator
//! (`State`: locals, assumptions, ghost cells). Runtime functions are inlined with
//! copy-in/copy-out of `&mut` arguments; natives are havoced. `if` forks the accumulator
//! and joins it with `ite`. Every `ensures`/`asserts` and every possible abort becomes an
//! itemized `Obligation` carrying the assumptions active at its program point.

use std::collections::BTreeMap;
use std::sync::Arc;

use num::{BigInt, Signed, Zero};
use prova_ast::{BinOp, Block, Expr, ExprKind, Ident, Span, Stmt, TypeRef, TypeRefKind, UnaryOp};
use prova_core::{
    Callee, ConstValue, FunctionInfo, FunctionKind, IntTy, Intrinsic, ParamMode, SpecFunction, SpecModel, Type,
};
use prova_parse::format_expr;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::VerifyError;
use crate::formula::{ArithOp, CmpOp, Sort, Term};
use crate::ghost::GhostStore;
use crate::snapshot::{Place, SnapshotId, SnapshotTable};
use crate::unbounded::{int_max, NumTy, UnboundedValue};
use crate::value::SymValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    Ensures,
    Asserts,
    /// The wrapped runtime code must not abort.
    AbortFree,
    /// Fixed-width arithmetic inside spec code must not overflow.
    SpecOverflow,
    DivisorNonZero,
}

impl ObligationKind {
    pub fn label(self) -> &'static str {
        match self {
            ObligationKind::Ensures => "ensures",
            ObligationKind::Asserts => "asserts",
            ObligationKind::AbortFree => "abort",
            ObligationKind::SpecOverflow => "overflow",
            ObligationKind::DivisorNonZero => "divisor",
        }
    }
}

/// A source-named term evaluated under a counterexample (`old_pool.balance`, `r`).
#[derive(Clone, Debug, PartialEq)]
pub struct Probe {
    pub name: String,
    pub term: Term,
}

#[derive(Clone, Debug)]
pub struct Obligation {
    pub id: usize,
    pub spec: String,
    pub kind: ObligationKind,
    pub description: String,
    pub span: Span,
    pub assumptions: Vec<Term>,
    pub goal: Term,
    pub probes: Vec<Probe>,
}

impl Obligation {
    /// `(∧ assumptions) ⇒ goal`
    pub fn formula(&self) -> Term {
        Term::implies(Term::and(self.assumptions.iter().cloned()), self.goal.clone())
    }

    /// Assertions whose unsatisfiability proves the obligation.
    pub fn refutation(&self) -> Vec<Term> {
        let mut out = self.assumptions.clone();
        out.push(Term::not(self.goal.clone()));
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolOrigin {
    Param,
    NativeResult { function: String },
    Havoc { function: String },
}

/// Source-level description of one solver variable.
#[derive(Clone, Debug)]
pub struct SymbolInfo {
    pub display: String,
    pub root: String,
    pub path: Vec<String>,
    /// Struct type at each level of `path`: `owners[i]` declares `path[i]`.
    pub owners: Vec<String>,
    pub ty: String,
    pub origin: SymbolOrigin,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn get(&self, var: &str) -> Option<&SymbolInfo> {
        self.symbols.get(var)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.symbols.contains_key(var)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SymbolInfo)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// All obligations of one spec function.
#[derive(Clone, Debug)]
pub struct SpecObligations {
    pub spec: String,
    pub target: String,
    pub span: Span,
    pub obligations: Vec<Obligation>,
    pub symbols: Arc<SymbolTable>,
    /// Runtime calls made directly from the spec body.
    pub checkpoints: usize,
}

/// Generate obligations for every `#[spec(prove)]` function, in declaration order.
pub fn generate_obligations(model: &SpecModel) -> Result<Vec<SpecObligations>, VerifyError> {
    model
        .specs
        .par_iter()
        .filter(|s| s.verify)
        .map(|s| generate_for_spec(model, s))
        .collect()
}

pub fn generate_for_spec(model: &SpecModel, spec: &SpecFunction) -> Result<SpecObligations, VerifyError> {
    let func = model
        .function(&spec.name)
        .ok_or_else(|| VerifyError::new(format!("unknown spec function `{}`", spec.name), spec.span))?;
    let walker = Walker {
        model,
        spec,
        qualified: format!("{}::{}", model.qualified_name(), spec.name),
        frame: Frame { func, mode: Mode::Spec },
        state: State::default(),
        obligations: Vec::new(),
        symbols: SymbolTable::default(),
        snapshots: SnapshotTable::default(),
        checkpoints: 0,
        fresh: 0,
    };
    let out = walker.run()?;
    info!(
        spec = %out.spec,
        obligations = out.obligations.len(),
        checkpoints = out.checkpoints,
        "generated obligations"
    );
    Ok(out)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Spec,
    Runtime,
}

#[derive(Clone, Copy)]
struct Frame<'m> {
    func: &'m FunctionInfo,
    mode: Mode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BindingKind {
    Param,
    Local,
    /// An `old!` image; reads go through the snapshot table.
    Snapshot(SnapshotId),
}

#[derive(Clone, Debug)]
struct Binding {
    name: String,
    value: SymValue,
    kind: BindingKind,
    mutable: bool,
}

#[derive(Clone, Debug, Default)]
struct State {
    locals: Vec<Binding>,
    assumptions: Vec<Term>,
    ghost: GhostStore,
    /// Every path reaching this point aborted. A contradictory `requires` does not kill the
    /// path; obligations past it carry `false` and are reported vacuous.
    dead: bool,
}

impl State {
    fn assume(&mut self, t: Term) {
        if t.is_true() {
            return;
        }
        self.assumptions.push(t);
    }

    /// Join the two branch states of a fork taken at `base_len` assumptions.
    fn join(cond: &Term, base_len: usize, then: State, otherwise: State) -> Result<State, String> {
        let mut assumptions = then.assumptions[..base_len].to_vec();
        match (then.dead, otherwise.dead) {
            (true, true) => {
                assumptions.push(Term::Bool(false));
                Ok(State {
                    locals: then.locals,
                    assumptions,
                    ghost: then.ghost,
                    dead: true,
                })
            }
            (true, false) => {
                assumptions.extend(otherwise.assumptions[base_len..].iter().cloned());
                Ok(State { assumptions, ..otherwise })
            }
            (false, true) => {
                assumptions.extend(then.assumptions[base_len..].iter().cloned());
                Ok(State { assumptions, ..then })
            }
            (false, false) => {
                let t = Term::and(then.assumptions[base_len + 1..].iter().cloned());
                let e = Term::and(otherwise.assumptions[base_len + 1..].iter().cloned());
                for extra in [Term::implies(cond.clone(), t), Term::implies(Term::not(cond.clone()), e)] {
                    if !extra.is_true() {
                        assumptions.push(extra);
                    }
                }

                if then.locals.len() != otherwise.locals.len() {
                    return Err("branches left different scopes".to_string());
                }
                let locals = then
                    .locals
                    .into_iter()
                    .zip(otherwise.locals)
                    .map(|(a, b)| {
                        Ok(Binding {
                            value: SymValue::merge(cond, a.value, b.value)?,
                            ..a
                        })
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                let ghost = GhostStore::merge(cond, then.ghost, otherwise.ghost)?;
                Ok(State {
                    locals,
                    assumptions,
                    ghost,
                    dead: false,
                })
            }
        }
    }
}

type VResult<T> = Result<T, VerifyError>;

struct Walker<'m> {
    model: &'m SpecModel,
    spec: &'m SpecFunction,
    qualified: String,
    frame: Frame<'m>,
    state: State,
    obligations: Vec<Obligation>,
    symbols: SymbolTable,
    snapshots: SnapshotTable,
    checkpoints: usize,
    fresh: usize,
}

fn mode_of(func: &FunctionInfo) -> Mode {
    match func.kind {
        FunctionKind::Spec(_) | FunctionKind::SpecHelper => Mode::Spec,
        FunctionKind::Runtime | FunctionKind::Native => Mode::Runtime,
    }
}

fn lit_fits(term: &Term, ty: IntTy) -> bool {
    term.as_int_lit()
        .is_some_and(|v| UnboundedValue::from(v.clone()).fits(ty))
}

fn type_name(ty: &TypeRef) -> Option<String> {
    match &ty.kind {
        TypeRefKind::Named { path, .. } => path.last().map(|p| p.node.clone()),
        _ => None,
    }
}

impl<'m> Walker<'m> {
    fn run(mut self) -> VResult<SpecObligations> {
        let func = self.frame.func;
        for p in &func.signature.params {
            let value = self.fresh_value(&p.name, &p.ty, SymbolOrigin::Param, p.span)?;
            self.state.locals.push(Binding {
                name: p.name.clone(),
                value,
                kind: BindingKind::Param,
                mutable: p.mode != ParamMode::BorrowedImmut,
            });
        }
        let body = func
            .body
            .as_ref()
            .ok_or_else(|| VerifyError::new("spec function has no body", func.span))?;
        self.eval_block(body)?;
        if !self.snapshots.is_empty() {
            debug!(spec = %self.qualified, snapshots = self.snapshots.len(), "walk finished");
        }
        if self.state.dead {
            // The rest of the body was never walked. Its assumptions hold `false`, so this
            // obligation comes back vacuous instead of the spec passing with nothing checked.
            let description = format!("end of `{}` is reachable (every path aborts)", self.spec.name);
            self.emit(ObligationKind::Ensures, description, self.spec.span, Term::Bool(true));
        }

        Ok(SpecObligations {
            spec: self.qualified,
            target: self.spec.target.clone(),
            span: self.spec.span,
            obligations: self.obligations,
            symbols: Arc::new(self.symbols),
            checkpoints: self.checkpoints,
        })
    }

    // ----- symbolic inputs -----

    fn fresh_value(&mut self, root: &str, ty: &Type, origin: SymbolOrigin, span: Span) -> VResult<SymValue> {
        self.fresh_leaves(root, &mut Vec::new(), &mut Vec::new(), ty, &origin, span)
    }

    fn fresh_leaves(
        &mut self,
        root: &str,
        path: &mut Vec<String>,
        owners: &mut Vec<String>,
        ty: &Type,
        origin: &SymbolOrigin,
        span: Span,
    ) -> VResult<SymValue> {
        match ty {
            Type::Unit => Ok(SymValue::Unit),
            Type::Ref { inner, .. } => self.fresh_leaves(root, path, owners, inner, origin, span),
            Type::Bool => Ok(SymValue::Bool(self.fresh_var(root, path, owners, "bool", Sort::Bool, origin))),
            Type::Int(t) => {
                let v = self.fresh_var(root, path, owners, t.name(), Sort::Int, origin);
                self.state.assume(Term::cmp(CmpOp::Ge, v.clone(), Term::int(0)));
                self.state.assume(Term::cmp(CmpOp::Le, v.clone(), Term::Int(int_max(*t))));
                Ok(SymValue::int(v, NumTy::Fixed(*t)))
            }
            Type::Integer => Ok(SymValue::int(
                self.fresh_var(root, path, owners, "Integer", Sort::Int, origin),
                NumTy::Unbounded,
            )),
            Type::Struct(name) => {
                let info = self
                    .model
                    .struct_info(name)
                    .ok_or_else(|| VerifyError::new(format!("unknown struct `{name}`"), span))?;
                let mut fields = Vec::with_capacity(info.fields.len());
                for (fname, fty) in &info.fields {
                    path.push(fname.clone());
                    owners.push(name.clone());
                    let v = self.fresh_leaves(root, path, owners, fty, origin, span);
                    path.pop();
                    owners.pop();
                    fields.push((fname.clone(), v?));
                }
                Ok(SymValue::Struct {
                    name: name.clone(),
                    fields,
                })
            }
        }
    }

    fn fresh_var(
        &mut self,
        root: &str,
        path: &[String],
        owners: &[String],
        ty: &str,
        sort: Sort,
        origin: &SymbolOrigin,
    ) -> Term {
        let mut display = root.to_string();
        for f in path {
            display.push('.');
            display.push_str(f);
        }
        let mut var = display.clone();
        while self.symbols.contains(&var) {
            self.fresh += 1;
            var = format!("{display}@{}", self.fresh);
        }
        self.symbols.symbols.insert(
            var.clone(),
            SymbolInfo {
                display,
                root: root.to_string(),
                path: path.to_vec(),
                owners: owners.to_vec(),
                ty: ty.to_string(),
                origin: origin.clone(),
            },
        );
        Term::var(var, sort)
    }

    // ----- obligations -----

    fn probes(&self) -> Vec<Probe> {
        let mut out = Vec::new();
        for b in &self.state.locals {
            let Some(value) = self.binding_value(b, &[]) else {
                continue;
            };
            for (name, term) in value.leaves(&b.name) {
                if matches!(&term, Term::Var(v, _) if *v == name) {
                    continue;
                }
                out.push(Probe { name, term });
            }
        }
        out
    }

    fn emit(&mut self, kind: ObligationKind, description: String, span: Span, goal: Term) {
        let id = self.obligations.len();
        debug!(spec = %self.qualified, id, kind = kind.label(), %description, "obligation");
        self.obligations.push(Obligation {
            id,
            spec: self.qualified.clone(),
            kind,
            description,
            span,
            assumptions: self.state.assumptions.clone(),
            goal,
            probes: self.probes(),
        });
    }

    /// Check `ok` at this point, then assume it.
    fn guard(&mut self, ok: Term, kind: ObligationKind, description: String, span: Span) {
        if ok.is_true() {
            return;
        }
        let skipped = kind == ObligationKind::AbortFree && self.spec.ignore_abort;
        if !skipped {
            self.emit(kind, description, span, ok.clone());
        }
        if ok.is_false() {
            self.state.dead = true;
        }
        self.state.assume(ok);
    }

    fn abort_kind(&self) -> ObligationKind {
        match self.frame.mode {
            Mode::Runtime => ObligationKind::AbortFree,
            Mode::Spec => ObligationKind::Asserts,
        }
    }

    fn overflow_kind(&self) -> ObligationKind {
        match self.frame.mode {
            Mode::Runtime => ObligationKind::AbortFree,
            Mode::Spec => ObligationKind::SpecOverflow,
        }
    }

    fn divisor_kind(&self) -> ObligationKind {
        match self.frame.mode {
            Mode::Runtime => ObligationKind::AbortFree,
            Mode::Spec => ObligationKind::DivisorNonZero,
        }
    }

    fn in_function(&self) -> String {
        match self.frame.mode {
            Mode::Runtime => format!(" in `{}`", self.frame.func.name),
            Mode::Spec => String::new(),
        }
    }

    // ----- control flow -----

    fn fork(
        &mut self,
        cond: Term,
        span: Span,
        then: impl FnOnce(&mut Self) -> VResult<SymValue>,
        otherwise: impl FnOnce(&mut Self) -> VResult<SymValue>,
    ) -> VResult<SymValue> {
        if cond.is_true() {
            return then(self);
        }
        if cond.is_false() {
            return otherwise(self);
        }

        let base = self.state.clone();
        let base_len = base.assumptions.len();

        self.state.assumptions.push(cond.clone());
        let then_value = then(self)?;
        let then_state = std::mem::replace(&mut self.state, base);

        self.state.assumptions.push(Term::not(cond.clone()));
        let else_value = otherwise(self)?;
        let else_state = std::mem::take(&mut self.state);

        self.state = State::join(&cond, base_len, then_state, else_state).map_err(|m| VerifyError::new(m, span))?;
        SymValue::merge(&cond, then_value, else_value).map_err(|m| VerifyError::new(m, span))
    }

    fn eval_block(&mut self, block: &Block) -> VResult<SymValue> {
        let depth = self.state.locals.len();
        let out = self.eval_block_inner(block);
        self.state.locals.truncate(depth);
        out
    }

    fn eval_block_inner(&mut self, block: &Block) -> VResult<SymValue> {
        for stmt in &block.stmts {
            if self.state.dead {
                return Ok(SymValue::Never);
            }
            self.eval_stmt(stmt)?;
        }
        if self.state.dead {
            return Ok(SymValue::Never);
        }
        match &block.tail {
            Some(t) => self.eval(t),
            None => Ok(SymValue::Unit),
        }
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> VResult<()> {
        match stmt {
            Stmt::Use(_) => Ok(()),
            Stmt::Let(l) => {
                let (value, kind) = match &l.expr.kind {
                    ExprKind::MacroCall { name, args } if name.node == "old" => {
                        let (id, value) = self.snapshot(Some(&l.name.node), args, l.expr.span)?;
                        (value, BindingKind::Snapshot(id))
                    }
                    _ => (self.eval(&l.expr)?, BindingKind::Local),
                };
                let value = match &l.ty {
                    Some(t) => {
                        let ty = self.resolve_type(t)?;
                        self.coerce(value, &ty, l.expr.span)?
                    }
                    None => value,
                };
                // The image lives in the snapshot table only.
                let value = match kind {
                    BindingKind::Snapshot(_) => SymValue::Unit,
                    _ => value,
                };
                self.state.locals.push(Binding {
                    name: l.name.node.clone(),
                    value,
                    kind,
                    mutable: l.mutable,
                });
                Ok(())
            }
            Stmt::Assign(a) => {
                let place = self.place_of(&a.target)?;
                let value = self.eval(&a.expr)?;
                if value == SymValue::Never {
                    return Ok(());
                }
                self.write_place(&place, value, a.span)
            }
            Stmt::Expr(e) => self.eval(e).map(|_| ()),
        }
    }

    // ----- places -----

    fn binding(&self, name: &str) -> Option<&Binding> {
        self.state.locals.iter().rev().find(|b| b.name == name)
    }

    fn place_of(&self, e: &Expr) -> VResult<Place> {
        match &e.kind {
            ExprKind::Path(p) if p.len() == 1 => Ok(Place {
                root: p[0].node.clone(),
                path: Vec::new(),
            }),
            ExprKind::Field { base, field } => {
                let mut place = self.place_of(base)?;
                place.path.push(field.node.clone());
                Ok(place)
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                expr,
            }
            | ExprKind::Borrow { expr, .. } => self.place_of(expr),
            _ => Err(VerifyError::new(
                format!("`{}` is not a place; expected a local or a field path", format_expr(e)),
                e.span,
            )),
        }
    }

    fn binding_value(&self, b: &Binding, path: &[String]) -> Option<SymValue> {
        match b.kind {
            BindingKind::Snapshot(id) => self.snapshots.get(id)?.read(path).cloned(),
            _ => b.value.at(path).cloned(),
        }
    }

    fn read_place(&self, place: &Place, span: Span) -> VResult<SymValue> {
        let b = self
            .binding(&place.root)
            .ok_or_else(|| VerifyError::new(format!("unknown local `{}`", place.root), span))?;
        self.binding_value(b, &place.path)
            .ok_or_else(|| VerifyError::new(format!("`{}` has no such field", place.display()), span))
    }

    fn check_writable(&self, place: &Place, span: Span) -> VResult<()> {
        let b = self
            .binding(&place.root)
            .ok_or_else(|| VerifyError::new(format!("unknown local `{}`", place.root), span))?;
        match b.kind {
            BindingKind::Snapshot(_) => Err(VerifyError::new(
                format!("snapshot `{}` is immutable and cannot be written", b.name),
                span,
            )),
            BindingKind::Param if !b.mutable => Err(VerifyError::new(
                format!("cannot write through immutable reference `{}`", b.name),
                span,
            )),
            BindingKind::Local if !b.mutable => Err(VerifyError::new(
                format!("cannot assign to immutable local `{}`", b.name),
                span,
            )
            .with_help(format!("declare it with `let mut {}`", b.name))),
            _ => Ok(()),
        }
    }

    fn write_place(&mut self, place: &Place, value: SymValue, span: Span) -> VResult<()> {
        self.check_writable(place, span)?;
        let current = self.read_place(place, span)?;
        let value = self.conform(value, &current, span)?;
        let idx = self
            .state
            .locals
            .iter()
            .rposition(|b| b.name == place.root)
            .ok_or_else(|| VerifyError::new(format!("unknown local `{}`", place.root), span))?;
        let slot = self.state.locals[idx]
            .value
            .at_mut(&place.path)
            .ok_or_else(|| VerifyError::new(format!("`{}` has no such field", place.display()), span))?;
        *slot = value;
        Ok(())
    }

    fn snapshot(&mut self, name: Option<&str>, args: &[Expr], span: Span) -> VResult<(SnapshotId, SymValue)> {
        let [arg] = args else {
            return Err(VerifyError::new("`old!` takes exactly one argument", span));
        };
        let place = self.place_of(arg)?;
        let is_mut_param = self
            .binding(&place.root)
            .is_some_and(|b| b.kind == BindingKind::Param && b.mutable)
            && self
                .frame
                .func
                .signature
                .param(&place.root)
                .is_some_and(|p| p.mode == ParamMode::BorrowedMut);
        if !is_mut_param {
            return Err(VerifyError::new(
                format!("`old!({})` is not rooted at a `&mut` parameter", place.display()),
                arg.span,
            ));
        }
        let value = self.read_place(&place, arg.span)?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("old!({})", place.display()));
        let id = self.snapshots.capture(name, place, &value, self.checkpoints, span);
        let snap = self
            .snapshots
            .get(id)
            .ok_or_else(|| VerifyError::new("snapshot was not recorded", span))?;
        debug!(snapshot = %snap.name, place = %snap.place.display(), taken_at = snap.taken_at, "captured");
        let image = snap.read(&[]).cloned().unwrap_or(SymValue::Unit);
        Ok((id, image))
    }

    // ----- types -----

    fn resolve_type(&self, ty: &TypeRef) -> VResult<Type> {
        self.model
            .resolve_type(ty)
            .map_err(|e| VerifyError::new(e.message, e.span))
    }

    fn coerce(&self, value: SymValue, ty: &Type, span: Span) -> VResult<SymValue> {
        let mismatch = |v: &SymValue| {
            VerifyError::new(
                format!("expected `{}`, found `{}`", ty.display(), v.type_name()),
                span,
            )
        };
        match (value, ty) {
            (SymValue::Never, _) => Ok(SymValue::Never),
            (v, Type::Ref { inner, .. }) => self.coerce(v, inner, span),
            (SymValue::Unit, Type::Unit) => Ok(SymValue::Unit),
            (v @ SymValue::Bool(_), Type::Bool) => Ok(v),
            (SymValue::Int { term, ty: NumTy::Literal }, Type::Int(t)) => {
                if !lit_fits(&term, *t) {
                    return Err(VerifyError::new(
                        format!("literal `{term}` does not fit in `{}`", t.name()),
                        span,
                    ));
                }
                Ok(SymValue::int(term, NumTy::Fixed(*t)))
            }
            (v @ SymValue::Int { ty: NumTy::Fixed(_), .. }, Type::Int(t)) => match &v {
                SymValue::Int { ty: NumTy::Fixed(s), .. } if s == t => Ok(v),
                _ => Err(mismatch(&v)),
            },
            (SymValue::Int { term, ty: NumTy::Literal | NumTy::Unbounded }, Type::Integer) => {
                Ok(SymValue::int(term, NumTy::Unbounded))
            }
            (v @ SymValue::Struct { .. }, Type::Struct(n)) => match &v {
                SymValue::Struct { name, .. } if name == n => Ok(v),
                _ => Err(mismatch(&v)),
            },
            (v, _) => Err(mismatch(&v)),
        }
    }

    /// Make `value` fit the shape of `current` for an assignment.
    fn conform(&self, value: SymValue, current: &SymValue, span: Span) -> VResult<SymValue> {
        match (value, current) {
            (SymValue::Int { term, ty: NumTy::Literal }, SymValue::Int { ty: NumTy::Fixed(t), .. }) => {
                self.coerce(SymValue::int(term, NumTy::Literal), &Type::Int(*t), span)
            }
            (SymValue::Int { term, ty: NumTy::Literal }, SymValue::Int { ty: NumTy::Unbounded, .. }) => {
                Ok(SymValue::int(term, NumTy::Unbounded))
            }
            (v, c) if v.type_name() == c.type_name() => Ok(v),
            (v, c) => Err(VerifyError::new(
                format!("cannot assign `{}` to a place of type `{}`", v.type_name(), c.type_name()),
                span,
            )),
        }
    }

    /// Operands of a binary integer operation with their common type.
    fn int_operands(&self, l: SymValue, r: SymValue, span: Span) -> VResult<(Term, Term, NumTy)> {
        let (SymValue::Int { term: a, ty: ta }, SymValue::Int { term: b, ty: tb }) = (&l, &r) else {
            return Err(VerifyError::new(
                format!(
                    "arithmetic needs integer operands, found `{}` and `{}`",
                    l.type_name(),
                    r.type_name()
                ),
                span,
            ));
        };
        let ty = ta.unify(*tb).map_err(|m| VerifyError::new(m, span))?;
        if let NumTy::Fixed(t) = ty {
            for (term, operand_ty) in [(a, ta), (b, tb)] {
                if *operand_ty == NumTy::Literal && !lit_fits(term, t) {
                    return Err(VerifyError::new(
                        format!("literal `{term}` does not fit in `{}`", t.name()),
                        span,
                    ));
                }
            }
        }
        Ok((a.clone(), b.clone(), ty))
    }

    fn eval_bool(&mut self, e: &Expr) -> VResult<Term> {
        match self.eval(e)? {
            SymValue::Bool(t) => Ok(t),
            SymValue::Never => Ok(Term::Bool(true)),
            other => Err(VerifyError::new(
                format!("expected `bool`, found `{}`", other.type_name()),
                e.span,
            )),
        }
    }

    // ----- expressions -----

    fn eval(&mut self, e: &Expr) -> VResult<SymValue> {
        match &e.kind {
            ExprKind::Unit => Ok(SymValue::Unit),
            ExprKind::BoolLit(b) => Ok(SymValue::Bool(Term::Bool(*b))),
            ExprKind::IntLit { value, suffix } => {
                let term = Term::int(BigInt::from(value.clone()));
                match suffix.as_deref().and_then(IntTy::from_name) {
                    Some(t) if t.fits(value) => Ok(SymValue::int(term, NumTy::Fixed(t))),
                    Some(t) => Err(VerifyError::new(
                        format!("literal `{value}` does not fit in `{}`", t.name()),
                        e.span,
                    )),
                    None => Ok(SymValue::int(term, NumTy::Literal)),
                }
            }
            ExprKind::Path(p) => self.eval_path(p, e.span),
            ExprKind::Unary { op, expr } => self.eval_unary(*op, expr, e),
            ExprKind::Borrow { mutable: true, .. } => Err(VerifyError::new(
                "mutable references may only be passed directly as call arguments",
                e.span,
            )),
            ExprKind::Borrow { expr, .. } => self.eval(expr),
            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right, e),
            ExprKind::Cast { expr, ty } => self.eval_cast(expr, ty, e),
            ExprKind::Field { base, field } => {
                if let Ok(place) = self.place_of(e) {
                    if self
                        .binding(&place.root)
                        .is_some_and(|b| matches!(b.kind, BindingKind::Snapshot(_)))
                    {
                        return self.read_place(&place, field.span);
                    }
                }
                let v = self.eval(base)?;
                if v == SymValue::Never {
                    return Ok(v);
                }
                v.field(&field.node).cloned().ok_or_else(|| {
                    VerifyError::new(
                        format!("`{}` has no field `{}`", v.type_name(), field.node),
                        field.span,
                    )
                })
            }
            ExprKind::Call { callee, type_args, args } => {
                let (kind, resolved) = self.model.resolve_call(&self.frame.func.scope, callee);
                match kind {
                    Callee::Intrinsic(i) => self.eval_intrinsic(i, type_args, args, e),
                    Callee::Function => self.call(&resolved, args, e.span),
                    Callee::Unknown => Err(VerifyError::new(format!("unknown function `{resolved}`"), e.span)),
                }
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
                ..
            } => self.eval_method(receiver, method, args, e),
            ExprKind::MacroCall { name, args } => match name.node.as_str() {
                "assert" => {
                    let Some(cond) = args.first() else {
                        return Err(VerifyError::new("`assert!` needs a condition", e.span));
                    };
                    let c = self.eval_bool(cond)?;
                    let description = format!("`{}`{} may fail", format_expr(e), self.in_function());
                    let kind = self.abort_kind();
                    self.guard(c, kind, description, e.span);
                    Ok(SymValue::Unit)
                }
                "old" => self.snapshot(None, args, e.span).map(|(_, v)| v),
                other => Err(VerifyError::new(format!("unknown macro `{other}!`"), name.span)),
            },
            ExprKind::Pack { name, fields, .. } => self.eval_pack(name, fields, e.span),
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let c = self.eval_bool(cond)?;
                if self.state.dead {
                    return Ok(SymValue::Never);
                }
                self.fork(
                    c,
                    e.span,
                    |w| w.eval_block(then_block),
                    |w| match else_block {
                        Some(b) => w.eval_block(b),
                        None => Ok(SymValue::Unit),
                    },
                )
            }
            ExprKind::Block(b) => self.eval_block(b),
            ExprKind::Abort(code) => {
                self.eval(code)?;
                let description = format!("`{}`{} is reachable", format_expr(e), self.in_function());
                let kind = self.abort_kind();
                self.guard(Term::Bool(false), kind, description, e.span);
                Ok(SymValue::Never)
            }
        }
    }

    fn eval_path(&self, p: &[Ident], span: Span) -> VResult<SymValue> {
        if let [name] = p {
            if let Some(b) = self.binding(&name.node) {
                return self
                    .binding_value(b, &[])
                    .ok_or_else(|| VerifyError::new(format!("snapshot `{}` was not recorded", b.name), span));
            }
            if let Some(c) = self.model.consts.get(&name.node) {
                return Ok(match (&c.value, &c.ty) {
                    (ConstValue::Int(v), Type::Int(t)) => SymValue::int(Term::int(BigInt::from(v.clone())), NumTy::Fixed(*t)),
                    (ConstValue::Bool(b), _) => SymValue::Bool(Term::Bool(*b)),
                    (ConstValue::Int(v), _) => SymValue::int(Term::int(BigInt::from(v.clone())), NumTy::Literal),
                });
            }
        }
        Err(VerifyError::new(
            format!("unknown name `{}`", prova_ast::path_to_string(p)),
            span,
        ))
    }

    fn eval_unary(&mut self, op: UnaryOp, inner: &Expr, e: &Expr) -> VResult<SymValue> {
        match op {
            UnaryOp::Deref => self.eval(inner),
            UnaryOp::Not => Ok(SymValue::Bool(Term::not(self.eval_bool(inner)?))),
            UnaryOp::Neg => match self.eval(inner)? {
                SymValue::Int {
                    term,
                    ty: ty @ (NumTy::Unbounded | NumTy::Literal),
                } => Ok(SymValue::int(Term::neg(term), ty)),
                SymValue::Never => Ok(SymValue::Never),
                other => Err(VerifyError::new(
                    format!("cannot negate `{}`; only `Integer` values are signed", other.type_name()),
                    e.span,
                )),
            },
        }
    }

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, e: &Expr) -> VResult<SymValue> {
        match op {
            BinOp::And => {
                let a = self.eval_bool(left)?;
                self.fork(
                    a,
                    e.span,
                    |w| Ok(SymValue::Bool(w.eval_bool(right)?)),
                    |_| Ok(SymValue::Bool(Term::Bool(false))),
                )
            }
            BinOp::Or => {
                let a = self.eval_bool(left)?;
                self.fork(
                    a,
                    e.span,
                    |_| Ok(SymValue::Bool(Term::Bool(true))),
                    |w| Ok(SymValue::Bool(w.eval_bool(right)?)),
                )
            }
            BinOp::Implies => {
                let a = self.eval_bool(left)?;
                self.fork(
                    a,
                    e.span,
                    |w| Ok(SymValue::Bool(w.eval_bool(right)?)),
                    |_| Ok(SymValue::Bool(Term::Bool(true))),
                )
            }
            BinOp::Eq | BinOp::Ne => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let eq = l.equals(&r).map_err(|m| VerifyError::new(m, e.span))?;
                Ok(SymValue::Bool(if op == BinOp::Eq { eq } else { Term::not(eq) }))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.compare(op, l, r, e.span)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                if l == SymValue::Never || r == SymValue::Never {
                    return Ok(SymValue::Never);
                }
                self.arith(op, l, r, e)
            }
        }
    }

    fn compare(&self, op: BinOp, l: SymValue, r: SymValue, span: Span) -> VResult<SymValue> {
        let (a, b, _) = self.int_operands(l, r, span)?;
        let cmp = match op {
            BinOp::Lt => CmpOp::Lt,
            BinOp::Le => CmpOp::Le,
            BinOp::Gt => CmpOp::Gt,
            _ => CmpOp::Ge,
        };
        Ok(SymValue::Bool(Term::cmp(cmp, a, b)))
    }

    fn arith(&mut self, op: BinOp, l: SymValue, r: SymValue, e: &Expr) -> VResult<SymValue> {
        let (a, b, ty) = self.int_operands(l, r, e.span)?;
        let aop = match op {
            BinOp::Add => ArithOp::Add,
            BinOp::Sub => ArithOp::Sub,
            BinOp::Mul => ArithOp::Mul,
            BinOp::Div => ArithOp::Div,
            _ => ArithOp::Mod,
        };
        let is_div = matches!(aop, ArithOp::Div | ArithOp::Mod);
        let divisor_is_zero = b.as_int_lit().is_some_and(Zero::is_zero);
        let text = format_expr(e);

        match ty {
            NumTy::Literal => {
                if is_div && divisor_is_zero {
                    return Err(VerifyError::new("division by zero in a constant expression", e.span));
                }
                let folded = Term::arith(aop, a, b);
                if folded.as_int_lit().is_some_and(Signed::is_negative) {
                    return Err(VerifyError::new(
                        format!("`{text}` underflows; literals are unsigned"),
                        e.span,
                    ));
                }
                Ok(SymValue::int(folded, NumTy::Literal))
            }
            NumTy::Unbounded => {
                if is_div {
                    if divisor_is_zero {
                        return Err(VerifyError::new(
                            format!("`{text}` divides an `Integer` by zero"),
                            e.span,
                        )
                        .with_help("`Integer` division is only defined for a non-zero divisor"));
                    }
                    let ok = Term::not(Term::eq(b.clone(), Term::int(0)));
                    self.guard(
                        ok,
                        ObligationKind::DivisorNonZero,
                        format!("divisor of `{text}` is non-zero"),
                        e.span,
                    );
                }
                Ok(SymValue::int(Term::arith(aop, a, b), NumTy::Unbounded))
            }
            NumTy::Fixed(t) => {
                let result = Term::arith(aop, a.clone(), b.clone());
                let (ok, what, kind) = match aop {
                    ArithOp::Add | ArithOp::Mul => (
                        Term::cmp(CmpOp::Le, result.clone(), Term::Int(int_max(t))),
                        "overflow",
                        self.overflow_kind(),
                    ),
                    ArithOp::Sub => (Term::cmp(CmpOp::Ge, a, b), "underflow", self.overflow_kind()),
                    ArithOp::Div | ArithOp::Mod => (
                        Term::not(Term::eq(b, Term::int(0))),
                        "divide by zero",
                        self.divisor_kind(),
                    ),
                };
                let description = format!("`{text}`{} may {what} (`{}`)", self.in_function(), t.name());
                self.guard(ok, kind, description, e.span);
                Ok(SymValue::int(result, NumTy::Fixed(t)))
            }
        }
    }

    fn eval_cast(&mut self, inner: &Expr, ty: &TypeRef, e: &Expr) -> VResult<SymValue> {
        let target = match self.resolve_type(ty)? {
            Type::Int(t) => t,
            other => {
                return Err(VerifyError::new(
                    format!("cannot cast to `{}`", other.display()),
                    ty.span,
                ));
            }
        };
        match self.eval(inner)? {
            SymValue::Never => Ok(SymValue::Never),
            SymValue::Int {
                term,
                ty: NumTy::Fixed(source),
            } => {
                if target.bits() < source.bits() {
                    let ok = Term::cmp(CmpOp::Le, term.clone(), Term::Int(int_max(target)));
                    let description = format!(
                        "`{}`{} may truncate (`{}` to `{}`)",
                        format_expr(e),
                        self.in_function(),
                        source.name(),
                        target.name()
                    );
                    let kind = self.overflow_kind();
                    self.guard(ok, kind, description, e.span);
                }
                Ok(SymValue::int(term, NumTy::Fixed(target)))
            }
            v @ SymValue::Int { ty: NumTy::Literal, .. } => self.coerce(v, &Type::Int(target), e.span),
            SymValue::Int {
                ty: NumTy::Unbounded, ..
            } => Err(VerifyError::new(
                "`Integer` values cannot be converted back to fixed-width integers",
                e.span,
            )),
            other => Err(VerifyError::new(
                format!("cannot cast `{}` to `{}`", other.type_name(), target.name()),
                e.span,
            )),
        }
    }

    fn eval_method(&mut self, receiver: &Expr, method: &Ident, args: &[Expr], e: &Expr) -> VResult<SymValue> {
        let recv = self.eval(receiver)?;
        if recv == SymValue::Never {
            return Ok(recv);
        }
        let name = method.node.as_str();
        let arity = if matches!(name, "to_int" | "neg") { 0 } else { 1 };
        if args.len() != arity {
            return Err(VerifyError::new(
                format!("`{name}` takes {arity} argument(s), got {}", args.len()),
                e.span,
            ));
        }

        if name == "to_int" {
            return match recv {
                SymValue::Int {
                    term,
                    ty: NumTy::Fixed(_) | NumTy::Literal,
                } => Ok(SymValue::int(term, NumTy::Unbounded)),
                other => Err(VerifyError::new(
                    format!("`to_int` lifts fixed-width integers, found `{}`", other.type_name()),
                    e.span,
                )),
            };
        }

        let SymValue::Int {
            term: recv_term,
            ty: NumTy::Unbounded,
        } = &recv
        else {
            return Err(VerifyError::new(
                format!("`{name}` is defined on `Integer`, found `{}`", recv.type_name()),
                method.span,
            )
            .with_help("lift fixed-width values with `.to_int()` first"));
        };

        if name == "neg" {
            return Ok(SymValue::int(Term::neg(recv_term.clone()), NumTy::Unbounded));
        }

        let arg = self.eval(&args[0])?;
        if let SymValue::Int { ty: NumTy::Fixed(t), .. } = &arg {
            return Err(VerifyError::new(
                format!("`{name}` expects an `Integer` argument, found `{}`", t.name()),
                args[0].span,
            )
            .with_help("lift fixed-width values with `.to_int()` first"));
        }
        match name {
            "add" => self.arith(BinOp::Add, recv, arg, e),
            "sub" => self.arith(BinOp::Sub, recv, arg, e),
            "mul" => self.arith(BinOp::Mul, recv, arg, e),
            "div" => self.arith(BinOp::Div, recv, arg, e),
            "mod" => self.arith(BinOp::Mod, recv, arg, e),
            "lt" => self.compare(BinOp::Lt, recv, arg, e.span),
            "lte" => self.compare(BinOp::Le, recv, arg, e.span),
            "gt" => self.compare(BinOp::Gt, recv, arg, e.span),
            "gte" => self.compare(BinOp::Ge, recv, arg, e.span),
            "eq" | "neq" => {
                let eq = recv.equals(&arg).map_err(|m| VerifyError::new(m, e.span))?;
                Ok(SymValue::Bool(if name == "eq" { eq } else { Term::not(eq) }))
            }
            other => Err(VerifyError::new(format!("unknown method `{other}`"), method.span)),
        }
    }

    fn eval_pack(&mut self, name: &[Ident], fields: &[(Ident, Expr)], span: Span) -> VResult<SymValue> {
        let sname = name.last().map(|n| n.node.clone()).unwrap_or_default();
        let info = self
            .model
            .struct_info(&sname)
            .ok_or_else(|| VerifyError::new(format!("unknown struct `{sname}`"), span))?;

        let mut given: BTreeMap<&str, SymValue> = BTreeMap::new();
        for (fname, fexpr) in fields {
            let Some(fty) = info.field(&fname.node) else {
                return Err(VerifyError::new(
                    format!("struct `{sname}` has no field `{}`", fname.node),
                    fname.span,
                ));
            };
            let v = self.eval(fexpr)?;
            if v == SymValue::Never {
                return Ok(v);
            }
            let v = self.coerce(v, fty, fexpr.span)?;
            if given.insert(fname.node.as_str(), v).is_some() {
                return Err(VerifyError::new(format!("field `{}` given twice", fname.node), fname.span));
            }
        }

        let mut out = Vec::with_capacity(info.fields.len());
        for (fname, _) in &info.fields {
            let v = given
                .remove(fname.as_str())
                .ok_or_else(|| VerifyError::new(format!("missing field `{fname}` in `{sname}`"), span))?;
            out.push((fname.clone(), v));
        }
        Ok(SymValue::Struct {
            name: sname,
            fields: out,
        })
    }

    // ----- intrinsics -----

    fn ghost_key(&self, type_args: &[TypeRef], span: Span) -> VResult<(String, Type)> {
        let [tag, value_ty] = type_args else {
            return Err(VerifyError::new(
                "ghost cells are addressed as `<Tag, ValueType>`",
                span,
            ));
        };
        let tag = type_name(tag).ok_or_else(|| VerifyError::new("ghost tag must be a named type", tag.span))?;
        Ok((tag, self.resolve_type(value_ty)?))
    }

    fn eval_intrinsic(&mut self, i: Intrinsic, type_args: &[TypeRef], args: &[Expr], e: &Expr) -> VResult<SymValue> {
        let expected = match i {
            Intrinsic::DeclareGlobal | Intrinsic::Global => 0,
            _ => 1,
        };
        if args.len() != expected {
            return Err(VerifyError::new(
                format!("`{}` takes {expected} argument(s), got {}", i.name(), args.len()),
                e.span,
            ));
        }

        match i {
            Intrinsic::Requires => {
                let c = self.eval_bool(&args[0])?;
                self.state.assume(c);
                Ok(SymValue::Unit)
            }
            Intrinsic::Ensures | Intrinsic::Asserts => {
                let c = self.eval_bool(&args[0])?;
                let kind = if i == Intrinsic::Ensures {
                    ObligationKind::Ensures
                } else {
                    ObligationKind::Asserts
                };
                self.emit(kind, format_expr(e), e.span, c.clone());
                self.state.assume(c);
                Ok(SymValue::Unit)
            }
            Intrinsic::Old => self.snapshot(None, args, e.span).map(|(_, v)| v),
            Intrinsic::DeclareGlobal => {
                let (tag, ty) = self.ghost_key(type_args, e.span)?;
                self.state
                    .ghost
                    .declare(&tag, &ty)
                    .map_err(|g| VerifyError::new(g.to_string(), e.span))?;
                Ok(SymValue::Unit)
            }
            Intrinsic::Global => {
                let (tag, ty) = self.ghost_key(type_args, e.span)?;
                self.state.ghost.read(&tag, &ty).map_err(|g| {
                    VerifyError::new(g.to_string(), e.span)
                        .with_help("ghost cells are scoped to one spec function; declare it in this one")
                })
            }
            Intrinsic::GhostSet => {
                let (tag, ty) = self.ghost_key(type_args, e.span)?;
                let v = self.eval(&args[0])?;
                if v == SymValue::Never {
                    return Ok(v);
                }
                let v = self.coerce(v, &ty, args[0].span)?;
                self.state
                    .ghost
                    .write(&tag, &ty, v)
                    .map_err(|g| VerifyError::new(g.to_string(), e.span))?;
                Ok(SymValue::Unit)
            }
            Intrinsic::EmitEvent => {
                let v = self.eval(&args[0])?;
                match v {
                    SymValue::Struct { name, .. } => {
                        self.state.ghost.emit(&name);
                        Ok(SymValue::Unit)
                    }
                    SymValue::Never => Ok(v),
                    other => Err(VerifyError::new(
                        format!("events are structs, found `{}`", other.type_name()),
                        args[0].span,
                    )),
                }
            }
        }
    }

    // ----- calls -----

    fn call(&mut self, name: &str, args: &[Expr], span: Span) -> VResult<SymValue> {
        let model = self.model;
        let func = model
            .function(name)
            .ok_or_else(|| VerifyError::new(format!("unknown function `{name}`"), span))?;
        if func.signature.params.len() != args.len() {
            return Err(VerifyError::new(
                format!(
                    "function `{name}` expects {} argument(s), got {}",
                    func.signature.params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let mut values = Vec::with_capacity(args.len());
        let mut places: Vec<Option<Place>> = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&func.signature.params) {
            if param.mode == ParamMode::BorrowedMut {
                let place = self.place_of(arg)?;
                self.check_writable(&place, arg.span)?;
                if places.iter().flatten().any(|p| p.overlaps(&place)) {
                    return Err(VerifyError::new(
                        format!("`{}` is passed mutably more than once", place.display()),
                        arg.span,
                    ));
                }
                let v = self.read_place(&place, arg.span)?;
                values.push(self.coerce(v, &param.ty, arg.span)?);
                places.push(Some(place));
            } else {
                let v = self.eval(arg)?;
                if v == SymValue::Never {
                    return Ok(v);
                }
                values.push(self.coerce(v, &param.ty, arg.span)?);
                places.push(None);
            }
        }

        if self.frame.mode == Mode::Spec && func.is_runtime() {
            self.checkpoints += 1;
            debug!(spec = %self.qualified, callee = %func.name, checkpoint = self.checkpoints, "runtime call");
        }

        let (ret, outs) = match &func.body {
            Some(body) => self.inline(func, values, body)?,
            None => self.havoc_native(func, values, span)?,
        };
        if self.state.dead {
            return Ok(SymValue::Never);
        }

        for (place, out) in places.into_iter().zip(outs) {
            if let Some(place) = place {
                self.write_place(&place, out, span)?;
            }
        }
        self.coerce(ret, &func.signature.ret, span)
    }

    fn inline(&mut self, func: &'m FunctionInfo, args: Vec<SymValue>, body: &Block) -> VResult<(SymValue, Vec<SymValue>)> {
        let saved_locals = std::mem::take(&mut self.state.locals);
        let saved_frame = std::mem::replace(
            &mut self.frame,
            Frame {
                func,
                mode: mode_of(func),
            },
        );
        for (param, value) in func.signature.params.iter().zip(args) {
            self.state.locals.push(Binding {
                name: param.name.clone(),
                value,
                kind: BindingKind::Param,
                mutable: param.mode != ParamMode::BorrowedImmut,
            });
        }

        let result = self.eval_block(body);
        let outs = self.state.locals.iter().map(|b| b.value.clone()).collect();

        self.state.locals = saved_locals;
        self.frame = saved_frame;
        Ok((result?, outs))
    }

    /// A native function returns an unconstrained value of its return type and may change
    /// anything reachable through its `&mut` parameters.
    fn havoc_native(&mut self, func: &FunctionInfo, args: Vec<SymValue>, span: Span) -> VResult<(SymValue, Vec<SymValue>)> {
        let origin_fn = func.name.clone();
        let ret = self.fresh_value(
            &format!("{}.result", func.name),
            &func.signature.ret,
            SymbolOrigin::NativeResult { function: origin_fn.clone() },
            span,
        )?;
        let mut outs = Vec::with_capacity(args.len());
        for (param, value) in func.signature.params.iter().zip(args) {
            if param.mode == ParamMode::BorrowedMut {
                outs.push(self.fresh_value(
                    &format!("{}.{}", func.name, param.name),
                    &param.ty,
                    SymbolOrigin::Havoc { function: origin_fn.clone() },
                    span,
                )?);
            } else {
                outs.push(value);
            }
        }
        Ok((ret, outs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Assignment, Value};
    use proptest::prelude::*;
    use prova_core::build_model;

    fn generate(src: &str) -> Result<Vec<SpecObligations>, VerifyError> {
        let module = prova_parse::parse_module(src).expect("parse");
        let model = build_model(&module).expect("model");
        generate_obligations(&model)
    }

    fn err(src: &str) -> String {
        generate(src).unwrap_err().message
    }

    #[test]
    fn unconditional_ensures_is_assumptions_implies_goal() {
        let out = generate(
            r#"
            module m::double {
                use prover::prover::ensures;
                fun double(x: u8): u16 { (x as u16) * 2 }
                #[spec(prove)]
                fun double_spec(x: u8): u16 {
                    let r = double(x);
                    ensures(r <= 20);
                    r
                }
            }
            "#,
        )
        .unwrap();
        let spec = &out[0];
        assert_eq!(spec.spec, "m::double::double_spec");
        assert_eq!(spec.checkpoints, 1);

        let x = Term::var("x", Sort::Int);
        let doubled = Term::Arith(ArithOp::Mul, Box::new(x.clone()), Box::new(Term::int(2)));

        let overflow = &spec.obligations[0];
        assert_eq!(overflow.kind, ObligationKind::AbortFree);

        let ensures = &spec.obligations[1];
        assert_eq!(ensures.kind, ObligationKind::Ensures);
        assert_eq!(ensures.description, "ensures(r <= 20)");
        assert_eq!(ensures.goal, Term::Cmp(CmpOp::Le, Box::new(doubled.clone()), Box::new(Term::int(20))));
        assert_eq!(
            ensures.assumptions,
            vec![
                Term::cmp(CmpOp::Ge, x.clone(), Term::int(0)),
                Term::cmp(CmpOp::Le, x, Term::int(255)),
                Term::cmp(CmpOp::Le, doubled, Term::int(65535)),
            ]
        );
        assert_eq!(
            ensures.formula(),
            Term::implies(Term::and(ensures.assumptions.clone()), ensures.goal.clone())
        );
        assert_eq!(ensures.probes[0].name, "r");
    }

    #[test]
    fn ignore_abort_turns_aborts_into_assumptions() {
        let out = generate(
            r#"
            module m::sub {
                use prover::prover::ensures;
                fun dec(x: u64): u64 { x - 1 }
                #[spec(prove, ignore_abort)]
                fun dec_spec(x: u64): u64 {
                    let r = dec(x);
                    ensures(r < x);
                    r
                }
            }
            "#,
        )
        .unwrap();
        let obligations = &out[0].obligations;
        assert_eq!(obligations.len(), 1);
        assert!(
            obligations[0]
                .assumptions
                .contains(&Term::cmp(CmpOp::Ge, Term::var("x", Sort::Int), Term::int(1)))
        );
    }

    #[test]
    fn branch_obligations_carry_the_branch_condition() {
        let out = generate(
            r#"
            module m::branch {
                use prover::prover::{requires, ensures};
                fun id(x: u64): u64 { x }
                #[spec(prove)]
                fun id_spec(x: u64): u64 {
                    let r = id(x);
                    if (x > 10) {
                        ensures(r > 10);
                    } else {
                        ensures(r <= 10);
                    };
                    r
                }
            }
            "#,
        )
        .unwrap();
        let obs = &out[0].obligations;
        assert_eq!(obs.len(), 2);
        let cond = Term::cmp(CmpOp::Gt, Term::var("x", Sort::Int), Term::int(10));
        assert_eq!(obs[0].assumptions.last(), Some(&cond));
        assert_eq!(obs[1].assumptions.last(), Some(&Term::not(cond)));
    }

    #[test]
    fn snapshots_are_immutable() {
        let msg = err(
            r#"
            module m::snap {
                use prover::prover::old;
                public struct Pool { balance: u64 }
                fun touch(p: &mut Pool) { p.balance = 1; }
                #[spec(prove)]
                fun touch_spec(p: &mut Pool) {
                    let mut before = old!(p);
                    touch(p);
                    before.balance = 2;
                }
            }
            "#,
        );
        assert!(msg.contains("immutable"), "{msg}");
    }

    #[test]
    fn snapshot_survives_the_call() {
        let out = generate(
            r#"
            module m::snap {
                use prover::prover::{ensures, old};
                public struct Pool { balance: u64 }
                fun drain(p: &mut Pool) { p.balance = 0; }
                #[spec(prove)]
                fun drain_spec(p: &mut Pool) {
                    let before = old!(p);
                    drain(p);
                    ensures(before.balance == p.balance + before.balance);
                }
            }
            "#,
        )
        .unwrap();
        let ensures = out[0]
            .obligations
            .iter()
            .find(|o| o.kind == ObligationKind::Ensures)
            .unwrap();
        let b = Term::var("p.balance", Sort::Int);
        assert_eq!(
            ensures.goal,
            Term::eq(b.clone(), Term::arith(ArithOp::Add, Term::int(0), b))
        );
    }

    #[test]
    fn undeclared_ghost_read_is_a_build_error() {
        let msg = err(
            r#"
            module m::ghosts {
                use prover::prover::ensures;
                use prover::ghost::global;
                public struct Big has copy, drop {}
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 {
                    let r = f(x);
                    ensures(*global<Big, bool>());
                    r
                }
            }
            "#,
        );
        assert!(msg.contains("not declared"), "{msg}");
    }

    #[test]
    fn integer_division_by_literal_zero_is_rejected() {
        let msg = err(
            r#"
            module m::ints {
                use prover::prover::ensures;
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 {
                    let r = f(x);
                    ensures(r.to_int().div(0) == r.to_int());
                    r
                }
            }
            "#,
        );
        assert!(msg.contains("by zero"), "{msg}");
    }

    #[test]
    fn integer_division_needs_a_divisor_obligation() {
        let out = generate(
            r#"
            module m::ints {
                use prover::prover::ensures;
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 {
                    let r = f(x);
                    ensures(r.to_int().div(x.to_int()) <= r.to_int());
                    r
                }
            }
            "#,
        )
        .unwrap();
        let kinds: Vec<_> = out[0].obligations.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![ObligationKind::DivisorNonZero, ObligationKind::Ensures]);
    }

    #[test]
    fn integers_do_not_mix_with_fixed_width() {
        let msg = err(
            r#"
            module m::ints {
                use prover::prover::ensures;
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 {
                    let r = f(x);
                    ensures(r.to_int() == x);
                    r
                }
            }
            "#,
        );
        assert!(msg.contains("to_int"), "{msg}");

        let msg = err(
            r#"
            module m::ints {
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 {
                    let r = f(x);
                    let back = (r.to_int() as u64);
                    back
                }
            }
            "#,
        );
        assert!(msg.contains("cannot be converted back"), "{msg}");
    }

    #[test]
    fn non_prove_specs_are_not_generated() {
        let out = generate(
            r#"
            module m::skip {
                fun f(x: u64): u64 { x }
                #[spec]
                fun f_spec(x: u64): u64 { f(x) }
            }
            "#,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn native_results_are_fresh_and_ranged() {
        let out = generate(
            r#"
            module m::native {
                use prover::prover::ensures;
                native fun price(): u8;
                fun quote(): u8 { price() }
                #[spec(prove)]
                fun quote_spec(): u8 {
                    let r = quote();
                    ensures(r <= 255);
                    r
                }
            }
            "#,
        )
        .unwrap();
        let spec = &out[0];
        let info = spec.symbols.get("price.result").expect("native result symbol");
        assert_eq!(info.origin, SymbolOrigin::NativeResult { function: "price".into() });
        assert_eq!(spec.obligations[0].assumptions.len(), 2);
    }

    fn env(pairs: &[(&str, u64)]) -> Assignment {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), Value::Int(BigInt::from(*v))))
            .collect()
    }

    fn holds(t: &Term, pairs: &[(&str, u64)]) -> bool {
        t.eval(&env(pairs)).as_bool()
    }

    #[test]
    fn contradictory_requires_still_emits_later_obligations() {
        for requires in ["1 > 2", "LIMIT < 5"] {
            let out = generate(&format!(
                r#"
                module m::limit {{
                    use prover::prover::{{requires, ensures}};
                    const LIMIT: u64 = 10;
                    fun id(x: u64): u64 {{ x }}
                    #[spec(prove)]
                    fun id_spec(x: u64): u64 {{
                        requires({requires});
                        let r = id(x);
                        ensures(r < x);
                        r
                    }}
                }}
                "#
            ))
            .unwrap();
            let obs = &out[0].obligations;
            assert_eq!(obs.len(), 1, "{requires}");
            assert_eq!(obs[0].description, "ensures(r < x)");
            assert!(obs[0].assumptions.contains(&Term::Bool(false)), "{requires}");
        }
    }

    #[test]
    fn always_aborting_target_leaves_a_reachability_obligation() {
        let src = |attrs: &str| {
            format!(
                r#"
                module m::boom {{
                    use prover::prover::ensures;
                    fun boom(x: u64): u64 {{ abort 7 }}
                    #[spec({attrs})]
                    fun boom_spec(x: u64): u64 {{
                        let r = boom(x);
                        ensures(r == 0);
                        r
                    }}
                }}
                "#
            )
        };

        let out = generate(&src("prove, ignore_abort")).unwrap();
        let obs = &out[0].obligations;
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].kind, ObligationKind::Ensures);
        assert!(obs[0].description.contains("every path aborts"), "{}", obs[0].description);
        assert!(obs[0].assumptions.contains(&Term::Bool(false)));

        let out = generate(&src("prove")).unwrap();
        let kinds: Vec<_> = out[0].obligations.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![ObligationKind::AbortFree, ObligationKind::Ensures]);
        assert_eq!(out[0].obligations[0].goal, Term::Bool(false));
    }

    #[test]
    fn both_branches_aborting_kills_the_join() {
        let out = generate(
            r#"
            module m::pick {
                use prover::prover::ensures;
                fun pick(x: u64): u64 {
                    if (x > 5) { abort 1 } else { abort 2 }
                }
                #[spec(prove, ignore_abort)]
                fun pick_spec(x: u64): u64 {
                    let r = pick(x);
                    ensures(r == x);
                    r
                }
            }
            "#,
        )
        .unwrap();
        let obs = &out[0].obligations;
        assert_eq!(obs.len(), 1);
        assert!(obs[0].description.contains("every path aborts"));
        assert_eq!(obs[0].assumptions.last(), Some(&Term::Bool(false)));
    }

    #[test]
    fn shadowed_snapshots_read_their_own_capture() {
        let out = generate(
            r#"
            module m::snap {
                use prover::prover::{ensures, old};
                public struct Pool { balance: u64 }
                fun bump(p: &mut Pool) { p.balance = p.balance + 1; }
                #[spec(prove)]
                fun bump_spec(p: &mut Pool) {
                    let s = old!(p);
                    bump(p);
                    let first = s.balance;
                    let s = old!(p);
                    bump(p);
                    ensures(s.balance + 1 == p.balance);
                    ensures(first + 2 == p.balance);
                }
            }
            "#,
        )
        .unwrap();
        let ensures: Vec<_> = out[0]
            .obligations
            .iter()
            .filter(|o| o.kind == ObligationKind::Ensures)
            .collect();
        assert_eq!(ensures.len(), 2);
        for balance in [0, 7, 1000] {
            assert!(holds(&ensures[0].goal, &[("p.balance", balance)]));
            assert!(holds(&ensures[1].goal, &[("p.balance", balance)]));
        }
        let probes: Vec<_> = ensures[0].probes.iter().map(|p| p.name.as_str()).collect();
        assert!(probes.contains(&"s.balance"), "{probes:?}");
        assert!(probes.contains(&"first"), "{probes:?}");
    }

    const LAST: &str = r#"
        module m::last {
            use prover::prover::{requires, ensures};
            use prover::ghost::{declare_global, global};
            use prover::ghost;
            public struct Last has copy, drop {}
            fun note(x: u64) {
                if (x > 3) {
                    ghost::set<Last, u64>(&x);
                };
            }
            #[spec(prove)]
            fun note_spec(x: u64) {
                DECLARE
                requires(x <= 10);
                note(x);
                ensures(x > 3 ==> *global<Last, u64>() == x);
                ensures(x <= 3 ==> *global<Last, u64>() == 0);
            }
        }
    "#;

    #[test]
    fn ghost_writes_under_a_branch_join_with_the_zero_value() {
        let out = generate(&LAST.replace("DECLARE", "declare_global<Last, u64>();")).unwrap();
        let ensures: Vec<_> = out[0]
            .obligations
            .iter()
            .filter(|o| o.kind == ObligationKind::Ensures)
            .collect();
        assert_eq!(ensures.len(), 2);
        for x in 0..=10 {
            assert!(holds(&ensures[0].goal, &[("x", x)]), "x = {x}");
            assert!(holds(&ensures[1].goal, &[("x", x)]), "x = {x}");
        }
    }

    #[test]
    fn ghost_writes_need_a_matching_declaration() {
        let msg = err(&LAST.replace("DECLARE", ""));
        assert!(msg.contains("`Last` is not declared"), "{msg}");

        let msg = err(&LAST.replace("DECLARE", "declare_global<Last, bool>();"));
        assert!(msg.contains("declared with type `bool` but is used as `u64`"), "{msg}");
    }

    #[test]
    fn integer_negation() {
        let src = |goal: &str| {
            format!(
                r#"
                module m::ints {{
                    use prover::prover::ensures;
                    fun f(x: u64): u64 {{ x }}
                    #[spec(prove)]
                    fun f_spec(x: u64): u64 {{
                        let r = f(x);
                        ensures({goal});
                        r
                    }}
                }}
                "#
            )
        };
        let out = generate(&src("r.to_int().neg().lte(0)")).unwrap();
        let x = Term::var("x", Sort::Int);
        assert_eq!(out[0].obligations[0].goal, Term::cmp(CmpOp::Le, Term::neg(x), Term::int(0)));

        let msg = err(&src("r.neg() == r"));
        assert!(msg.contains("`neg` is defined on `Integer`, found `u64`"), "{msg}");
    }

    #[test]
    fn u256_literals_beyond_u128() {
        let out = generate(
            r#"
            module m::wide {
                use prover::prover::ensures;
                fun f(x: u256): u256 { x }
                #[spec(prove)]
                fun f_spec(x: u256): u256 {
                    let r = f(x);
                    ensures(r <= 115792089237316195423570985008687907853269984665640564039457584007913129639935u256);
                    r
                }
            }
            "#,
        )
        .unwrap();
        let max = int_max(IntTy::U256);
        let ensures = &out[0].obligations[0];
        assert_eq!(
            ensures.goal,
            Term::cmp(CmpOp::Le, Term::var("x", Sort::Int), Term::int(max))
        );

        let msg = err(
            r#"
            module m::wide {
                fun f(x: u256): u256 { x }
                #[spec(prove)]
                fun f_spec(x: u256): u256 {
                    f(x) + 115792089237316195423570985008687907853269984665640564039457584007913129639936u256
                }
            }
            "#,
        );
        assert!(msg.contains("does not fit in `u256`"), "{msg}");
    }

    const LIFTED_PRODUCT: &str = r#"
        module m::mul {
            use prover::prover::ensures;
            fun mul(a: u64, b: u64): u64 { b * a }
            #[spec(prove)]
            fun mul_spec(a: u64, b: u64): u64 {
                let r = mul(a, b);
                ensures(r.to_int() == a.to_int().mul(b.to_int()));
                r
            }
        }
    "#;

    proptest! {
        #[test]
        fn lifted_product_agrees_with_the_fixed_width_product(a in 0u64..(1 << 33), b in 0u64..(1 << 33)) {
            let out = generate(LIFTED_PRODUCT).unwrap();
            let obs = &out[0].obligations;
            let inputs = [("a", a), ("b", b)];
            let overflow = obs.iter().find(|o| o.kind == ObligationKind::AbortFree).unwrap();
            let ensures = obs.iter().find(|o| o.kind == ObligationKind::Ensures).unwrap();

            prop_assert_eq!(holds(&overflow.goal, &inputs), a.checked_mul(b).is_some());
            if a.checked_mul(b).is_some() {
                prop_assert!(ensures.assumptions.iter().all(|t| holds(t, &inputs)));
                prop_assert!(holds(&ensures.goal, &inputs));
            }
        }
    }
}
