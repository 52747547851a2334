#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use num::{BigUint, Zero};
use prova_ast::{
    path_to_string, walk_block_exprs, AttrArg, Attribute, BinOp, Block, Expr, ExprKind, FunDef,
    Ident, Item, Module, Span, TypeRef, TypeRefKind, UnaryOp,
};

use crate::error::SemanticError;
use crate::scope::{Intrinsic, Scope};
use crate::signature::{FunctionSignature, ParamMode, SignatureParam};
use crate::types::{IntTy, Type};

/// Methods available on the spec-only `Integer` type (plus `to_int` on fixed-width values).
pub const INTEGER_METHODS: [&str; 13] = [
    "to_int", "add", "sub", "mul", "div", "mod", "neg", "lt", "lte", "gt", "gte", "eq", "neq",
];

#[derive(Clone, Debug)]
pub struct StructInfo {
    pub name: String,
    pub span: Span,
    pub fields: Vec<(String, Type)>,
    pub abilities: Vec<String>,
}

impl StructInfo {
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstValue {
    Int(BigUint),
    Bool(bool),
}

#[derive(Clone, Debug)]
pub struct ConstInfo {
    pub name: String,
    pub span: Span,
    pub ty: Type,
    pub value: ConstValue,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecAttrs {
    /// `#[spec(prove)]`; plain `#[spec]` functions are modeled but not discharged.
    pub verify: bool,
    /// `#[spec(prove, ignore_abort)]`: runtime aborts become assumptions instead of obligations.
    pub ignore_abort: bool,
    pub target: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Runtime,
    Native,
    Spec(SpecAttrs),
    /// `#[spec_only]` helper callable from spec code.
    SpecHelper,
}

#[derive(Clone, Debug)]
pub struct FunctionInfo {
    pub name: String,
    pub span: Span,
    pub signature: FunctionSignature,
    pub body: Option<Block>,
    pub scope: Scope,
    pub kind: FunctionKind,
}

impl FunctionInfo {
    pub fn is_runtime(&self) -> bool {
        matches!(self.kind, FunctionKind::Runtime | FunctionKind::Native)
    }

    pub fn is_spec_code(&self) -> bool {
        matches!(self.kind, FunctionKind::Spec(_) | FunctionKind::SpecHelper)
    }
}

/// A resolved shadow function: the spec body plus the runtime function it verifies.
#[derive(Clone, Debug)]
pub struct SpecFunction {
    pub name: String,
    pub span: Span,
    pub target: String,
    /// Runtime functions called directly from the spec body, in order of first call.
    pub callees: Vec<String>,
    pub verify: bool,
    pub ignore_abort: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callee {
    Intrinsic(Intrinsic),
    Function,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct SpecModel {
    pub address: String,
    pub name: String,
    pub structs: BTreeMap<String, StructInfo>,
    pub consts: BTreeMap<String, ConstInfo>,
    pub functions: BTreeMap<String, FunctionInfo>,
    pub specs: Vec<SpecFunction>,
}

impl SpecModel {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.address, self.name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn struct_info(&self, name: &str) -> Option<&StructInfo> {
        self.structs.get(name)
    }

    pub fn spec(&self, name: &str) -> Option<&SpecFunction> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Resolve a type reference against this module. Type arguments of structs are ignored.
    pub fn resolve_type(&self, ty: &TypeRef) -> Result<Type, SemanticError> {
        resolve_type_with(ty, &|n| self.structs.contains_key(n))
    }

    /// Resolve a call path to an intrinsic or a function of this module.
    /// Returns the function name for module functions.
    pub fn resolve_call(&self, scope: &Scope, callee: &[Ident]) -> (Callee, String) {
        let full = scope.resolve(callee);
        if let Some(i) = Intrinsic::from_path(&full) {
            return (Callee::Intrinsic(i), full);
        }
        if callee.len() == 1 && self.functions.contains_key(&callee[0].node) {
            return (Callee::Function, callee[0].node.clone());
        }
        let prefix = format!("{}::", self.qualified_name());
        if let Some(rest) = full.strip_prefix(&prefix) {
            if self.functions.contains_key(rest) {
                return (Callee::Function, rest.to_string());
            }
        }
        (Callee::Unknown, full)
    }
}

fn resolve_type_with(ty: &TypeRef, is_struct: &dyn Fn(&str) -> bool) -> Result<Type, SemanticError> {
    match &ty.kind {
        TypeRefKind::Unit => Ok(Type::Unit),
        TypeRefKind::Ref { mutable, inner } => Ok(Type::Ref {
            mutable: *mutable,
            inner: Box::new(resolve_type_with(inner, is_struct)?),
        }),
        TypeRefKind::Named { path, .. } => {
            let full = path_to_string(path);
            let last = path.last().map(|p| p.node.as_str()).unwrap_or_default();
            if path.len() == 1 {
                if last == "bool" {
                    return Ok(Type::Bool);
                }
                if let Some(t) = IntTy::from_name(last) {
                    return Ok(Type::Int(t));
                }
                if is_struct(last) {
                    return Ok(Type::Struct(last.to_string()));
                }
            }
            if last == "Integer" && (path.len() == 1 || full == "std::integer::Integer") {
                return Ok(Type::Integer);
            }
            Err(SemanticError::new(format!("unknown type `{full}`"), ty.span))
        }
    }
}

pub fn build_model(module: &Module) -> Result<SpecModel, SemanticError> {
    ModelBuilder::new(module).build()
}

struct ModelBuilder<'a> {
    module: &'a Module,
    scope: Scope,
    model: SpecModel,
}

impl<'a> ModelBuilder<'a> {
    fn new(module: &'a Module) -> Self {
        Self {
            module,
            scope: Scope::default(),
            model: SpecModel {
                address: module.address.node.clone(),
                name: module.name.node.clone(),
                structs: BTreeMap::new(),
                consts: BTreeMap::new(),
                functions: BTreeMap::new(),
                specs: Vec::new(),
            },
        }
    }

    fn build(mut self) -> Result<SpecModel, SemanticError> {
        for item in &self.module.items {
            if let Item::Use(u) = item {
                self.scope.add_use(u);
            }
        }

        self.collect_structs()?;
        self.collect_consts()?;
        self.collect_functions()?;
        self.check_call_cycles()?;

        let names: Vec<String> = self.model.functions.keys().cloned().collect();
        for name in &names {
            self.check_body(name)?;
        }
        for name in &names {
            let info = &self.model.functions[name];
            if let FunctionKind::Spec(attrs) = &info.kind {
                let spec = self.resolve_spec(info, attrs)?;
                self.model.specs.push(spec);
            }
        }
        // Declaration order makes reports stable and readable.
        let order: BTreeMap<&str, usize> = self
            .module
            .functions()
            .enumerate()
            .map(|(i, f)| (f.name.node.as_str(), i))
            .collect();
        self.model
            .specs
            .sort_by_key(|s| order.get(s.name.as_str()).copied().unwrap_or(usize::MAX));

        Ok(self.model)
    }

    fn collect_structs(&mut self) -> Result<(), SemanticError> {
        let mut names = BTreeSet::new();
        for s in self.module.structs() {
            if !names.insert(s.name.node.clone()) {
                return Err(SemanticError::new(
                    format!("duplicate struct `{}`", s.name.node),
                    s.name.span,
                ));
            }
        }

        for s in self.module.structs() {
            let mut fields = Vec::new();
            let mut seen = BTreeSet::new();
            for f in &s.fields {
                if !seen.insert(f.name.node.clone()) {
                    return Err(SemanticError::new(
                        format!("duplicate field `{}` in `{}`", f.name.node, s.name.node),
                        f.name.span,
                    ));
                }
                let ty = resolve_type_with(&f.ty, &|n| names.contains(n))?;
                if matches!(ty, Type::Ref { .. }) {
                    return Err(SemanticError::new("struct fields cannot be references", f.ty.span));
                }
                if ty.mentions_integer() && !prova_ast::has_attr(&s.attrs, "spec_only") {
                    return Err(SemanticError::new(
                        "`Integer` is spec-only and cannot be stored in a runtime struct",
                        f.ty.span,
                    ));
                }
                fields.push((f.name.node.clone(), ty));
            }
            self.model.structs.insert(
                s.name.node.clone(),
                StructInfo {
                    name: s.name.node.clone(),
                    span: s.span,
                    fields,
                    abilities: s.abilities.iter().map(|a| a.node.clone()).collect(),
                },
            );
        }

        // Symbolic values are expanded field by field, so nesting must be finite.
        for s in self.model.structs.values() {
            let mut stack = vec![s.name.clone()];
            self.check_struct_acyclic(s, &mut stack)?;
        }
        Ok(())
    }

    fn check_struct_acyclic(&self, s: &StructInfo, stack: &mut Vec<String>) -> Result<(), SemanticError> {
        for (_, ty) in &s.fields {
            if let Type::Struct(inner) = ty {
                if stack.contains(inner) {
                    return Err(SemanticError::new(
                        format!("recursive struct `{}` is not supported", stack[0]),
                        self.model.structs[&stack[0]].span,
                    ));
                }
                if let Some(next) = self.model.structs.get(inner) {
                    stack.push(inner.clone());
                    self.check_struct_acyclic(next, stack)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    fn collect_consts(&mut self) -> Result<(), SemanticError> {
        for item in &self.module.items {
            let Item::Const(c) = item else { continue };
            if self.model.consts.contains_key(&c.name.node) {
                return Err(SemanticError::new(
                    format!("duplicate constant `{}`", c.name.node),
                    c.name.span,
                ));
            }
            let ty = self.model.resolve_type(&c.ty)?;
            let value = self.eval_const(&c.value)?;
            match (&ty, &value) {
                (Type::Int(t), ConstValue::Int(v)) if t.fits(v) => {}
                (Type::Bool, ConstValue::Bool(_)) => {}
                _ => {
                    return Err(SemanticError::new(
                        format!("constant `{}` does not fit its type `{}`", c.name.node, ty.display()),
                        c.value.span,
                    ));
                }
            }
            self.model.consts.insert(
                c.name.node.clone(),
                ConstInfo {
                    name: c.name.node.clone(),
                    span: c.span,
                    ty,
                    value,
                },
            );
        }
        Ok(())
    }

    fn eval_const(&self, expr: &Expr) -> Result<ConstValue, SemanticError> {
        let unsupported = || SemanticError::new("unsupported or overflowing constant expression", expr.span);
        match &expr.kind {
            ExprKind::IntLit { value, .. } => Ok(ConstValue::Int(value.clone())),
            ExprKind::BoolLit(b) => Ok(ConstValue::Bool(*b)),
            ExprKind::Path(p) if p.len() == 1 => self
                .model
                .consts
                .get(&p[0].node)
                .map(|c| c.value.clone())
                .ok_or_else(|| SemanticError::new(format!("unknown constant `{}`", p[0].node), expr.span)),
            ExprKind::Unary { op: UnaryOp::Not, expr: inner } => match self.eval_const(inner)? {
                ConstValue::Bool(b) => Ok(ConstValue::Bool(!b)),
                ConstValue::Int(_) => Err(unsupported()),
            },
            ExprKind::Binary { left, op, right } => {
                let (ConstValue::Int(l), ConstValue::Int(r)) = (self.eval_const(left)?, self.eval_const(right)?)
                else {
                    return Err(unsupported());
                };
                let out = match op {
                    BinOp::Add => Some(l + r),
                    BinOp::Sub => (l >= r).then(|| l - r),
                    BinOp::Mul => Some(l * r),
                    BinOp::Div => (!r.is_zero()).then(|| l / r),
                    BinOp::Mod => (!r.is_zero()).then(|| l % r),
                    _ => None,
                };
                out.map(ConstValue::Int).ok_or_else(unsupported)
            }
            _ => Err(unsupported()),
        }
    }

    fn collect_functions(&mut self) -> Result<(), SemanticError> {
        for f in self.module.functions() {
            if self.model.functions.contains_key(&f.name.node) {
                return Err(SemanticError::new(
                    format!("duplicate function `{}`", f.name.node),
                    f.name.span,
                ));
            }
            let kind = function_kind(f)?;
            let signature = self.signature(f, &kind)?;

            let mut scope = self.scope.clone();
            if let Some(body) = &f.body {
                for u in prova_ast::block_uses(body) {
                    scope.add_use(u);
                }
            }

            self.model.functions.insert(
                f.name.node.clone(),
                FunctionInfo {
                    name: f.name.node.clone(),
                    span: f.span,
                    signature,
                    body: f.body.clone(),
                    scope,
                    kind,
                },
            );
        }
        Ok(())
    }

    fn signature(&self, f: &FunDef, kind: &FunctionKind) -> Result<FunctionSignature, SemanticError> {
        let is_spec_code = matches!(kind, FunctionKind::Spec(_) | FunctionKind::SpecHelper);
        let mut params = Vec::new();
        let mut seen = BTreeSet::new();
        for p in &f.params {
            if !seen.insert(p.name.node.clone()) {
                return Err(SemanticError::new(
                    format!("duplicate parameter `{}`", p.name.node),
                    p.name.span,
                ));
            }
            if let TypeRefKind::Named { path, .. } = &p.ty.kind {
                if path.len() == 1 && f.type_params.iter().any(|t| t.node == path[0].node) {
                    return Err(SemanticError::new(
                        "parameters of generic type are not supported by the verifier",
                        p.ty.span,
                    ));
                }
            }
            let ty = self.model.resolve_type(&p.ty)?;
            if ty.mentions_integer() && !is_spec_code {
                return Err(SemanticError::new(
                    "`Integer` is spec-only and cannot appear in a runtime signature",
                    p.ty.span,
                ));
            }
            params.push(SignatureParam {
                name: p.name.node.clone(),
                span: p.span,
                mode: ParamMode::of(&ty),
                ty,
            });
        }
        let ret = match &f.ret {
            Some(t) => self.model.resolve_type(t)?,
            None => Type::Unit,
        };
        if ret.mentions_integer() && !is_spec_code {
            return Err(SemanticError::new(
                "`Integer` is spec-only and cannot appear in a runtime signature",
                f.ret.as_ref().map(|t| t.span).unwrap_or(f.name.span),
            ));
        }
        Ok(FunctionSignature::new(f.name.node.clone(), params, ret))
    }

    fn check_body(&self, name: &str) -> Result<(), SemanticError> {
        let info = &self.model.functions[name];
        let Some(body) = &info.body else { return Ok(()) };
        let runtime = info.is_runtime();

        let mut result = Ok(());
        walk_block_exprs(body, &mut |e| {
            if result.is_ok() {
                result = self.check_expr(info, runtime, e);
            }
        });
        result
    }

    fn check_expr(&self, info: &FunctionInfo, runtime: bool, e: &Expr) -> Result<(), SemanticError> {
        match &e.kind {
            ExprKind::Call { callee, args, .. } => {
                let (kind, resolved) = self.model.resolve_call(&info.scope, callee);
                match kind {
                    Callee::Unknown => {
                        let hint = match callee.last().map(|c| c.node.as_str()) {
                            Some(n @ ("requires" | "ensures" | "asserts")) => {
                                format!("; add `use prover::prover::{n};`")
                            }
                            Some(n @ ("declare_global" | "global")) => {
                                format!("; add `use prover::ghost::{n};`")
                            }
                            _ => String::new(),
                        };
                        Err(SemanticError::new(format!("unknown function `{resolved}`{hint}"), e.span))
                    }
                    Callee::Intrinsic(i) if runtime && i.is_spec_only() => Err(SemanticError::new(
                        format!("`{}` is spec-only and cannot be used in runtime function `{}`", i.name(), info.name),
                        e.span,
                    )),
                    Callee::Intrinsic(_) => Ok(()),
                    Callee::Function => {
                        let target = &self.model.functions[&resolved];
                        if matches!(target.kind, FunctionKind::Spec(_)) {
                            return Err(SemanticError::new(
                                format!("spec function `{resolved}` cannot be called"),
                                e.span,
                            ));
                        }
                        if runtime && target.kind == FunctionKind::SpecHelper {
                            return Err(SemanticError::new(
                                format!("spec-only function `{resolved}` cannot be called from runtime function `{}`", info.name),
                                e.span,
                            ));
                        }
                        target
                            .signature
                            .validate_call_arity(args.len())
                            .map_err(|m| SemanticError::new(m, e.span))
                    }
                }
            }
            ExprKind::MacroCall { name, args } => match name.node.as_str() {
                "assert" => {
                    if args.is_empty() || args.len() > 2 {
                        return Err(SemanticError::new("`assert!` takes a condition and an optional abort code", e.span));
                    }
                    Ok(())
                }
                "old" => {
                    if Intrinsic::from_path(&info.scope.resolve_name("old")) != Some(Intrinsic::Old) {
                        return Err(SemanticError::new(
                            "`old!` needs `use prover::prover::old;`",
                            name.span,
                        ));
                    }
                    if !matches!(info.kind, FunctionKind::Spec(_)) {
                        return Err(SemanticError::new(
                            format!("`old!` may only be used in a spec function, not in `{}`", info.name),
                            e.span,
                        ));
                    }
                    self.check_snapshot_root(info, args, e.span)
                }
                other => Err(SemanticError::new(format!("unknown macro `{other}!`"), name.span)),
            },
            ExprKind::MethodCall { method, .. } => {
                if !INTEGER_METHODS.contains(&method.node.as_str()) {
                    return Err(SemanticError::new(format!("unknown method `{}`", method.node), method.span));
                }
                if runtime {
                    return Err(SemanticError::new(
                        format!("`{}` works on spec-only `Integer` values and cannot be used in runtime code", method.node),
                        method.span,
                    ));
                }
                Ok(())
            }
            ExprKind::Cast { ty, .. } => {
                let t = self.model.resolve_type(ty)?;
                if !matches!(t, Type::Int(_)) {
                    return Err(SemanticError::new(
                        format!("cannot cast to `{}`; only fixed-width integer casts are allowed", t.display()),
                        ty.span,
                    ));
                }
                Ok(())
            }
            ExprKind::Pack { name, .. } => {
                let n = name.last().map(|p| p.node.as_str()).unwrap_or_default();
                if name.len() == 1 && !self.model.structs.contains_key(n) {
                    return Err(SemanticError::new(format!("unknown struct `{n}`"), e.span));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `old!(e)`: `e` must be a `&mut` parameter, optionally followed by field accesses.
    fn check_snapshot_root(&self, info: &FunctionInfo, args: &[Expr], span: Span) -> Result<(), SemanticError> {
        let [arg] = args else {
            return Err(SemanticError::new("`old!` takes exactly one argument", span));
        };
        let root = place_root(arg).ok_or_else(|| {
            SemanticError::new("`old!` needs a parameter or a field path rooted at one", arg.span)
        })?;
        let Some(param) = info.signature.param(&root.node) else {
            return Err(SemanticError::new(
                format!("`{}` is not a parameter; snapshots can only be taken of `&mut` parameters", root.node),
                root.span,
            ));
        };
        if param.mode != ParamMode::BorrowedMut {
            return Err(SemanticError::new(
                format!(
                    "`{}` is {}; snapshots can only be taken of state reachable through a `&mut` parameter",
                    root.node,
                    param.mode.display()
                ),
                root.span,
            ));
        }
        Ok(())
    }

    fn check_call_cycles(&self) -> Result<(), SemanticError> {
        let mut edges: BTreeMap<&str, Vec<(&str, Span)>> = BTreeMap::new();
        for (name, info) in &self.model.functions {
            let Some(body) = &info.body else { continue };
            let mut out = Vec::new();
            walk_block_exprs(body, &mut |e| {
                if let ExprKind::Call { callee, .. } = &e.kind {
                    if let (Callee::Function, f) = self.model.resolve_call(&info.scope, callee) {
                        if let Some((key, _)) = self.model.functions.get_key_value(&f) {
                            out.push((key.as_str(), e.span));
                        }
                    }
                }
            });
            edges.insert(name.as_str(), out);
        }

        fn visit<'s>(
            node: &'s str,
            edges: &BTreeMap<&'s str, Vec<(&'s str, Span)>>,
            path: &mut Vec<&'s str>,
            done: &mut BTreeSet<&'s str>,
        ) -> Result<(), SemanticError> {
            if done.contains(node) {
                return Ok(());
            }
            path.push(node);
            for (next, span) in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
                if path.contains(next) {
                    let mut cycle: Vec<&str> = path.iter().skip_while(|n| **n != *next).copied().collect();
                    cycle.push(*next);
                    return Err(SemanticError::new(
                        format!("recursive call cycle `{}` is not supported", cycle.join(" -> ")),
                        *span,
                    ));
                }
                visit(*next, edges, path, done)?;
            }
            path.pop();
            done.insert(node);
            Ok(())
        }

        let mut done = BTreeSet::new();
        for name in edges.keys() {
            visit(*name, &edges, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn resolve_spec(&self, info: &FunctionInfo, attrs: &SpecAttrs) -> Result<SpecFunction, SemanticError> {
        let mut callees: Vec<String> = Vec::new();
        if let Some(body) = &info.body {
            walk_block_exprs(body, &mut |e| {
                if let ExprKind::Call { callee, .. } = &e.kind {
                    if let (Callee::Function, f) = self.model.resolve_call(&info.scope, callee) {
                        if self.model.functions[&f].is_runtime() && !callees.contains(&f) {
                            callees.push(f);
                        }
                    }
                }
            });
        }

        let target = if let Some(t) = &attrs.target {
            let short = t.rsplit("::").next().unwrap_or(t).to_string();
            if !callees.contains(&short) {
                return Err(SemanticError::new(
                    format!("`{}` names target `{t}` but never calls it", info.name),
                    info.span,
                ));
            }
            short
        } else if let Some(stem) = info.name.strip_suffix("_spec").filter(|s| callees.iter().any(|c| c == s)) {
            stem.to_string()
        } else {
            match callees.as_slice() {
                [only] => only.clone(),
                [] => {
                    return Err(SemanticError::new(
                        format!("spec function `{}` does not call any runtime function", info.name),
                        info.span,
                    ));
                }
                many => {
                    return Err(SemanticError::new(
                        format!(
                            "spec function `{}` calls {} runtime functions ({}); name one with `#[spec(target = ...)]`",
                            info.name,
                            many.len(),
                            many.join(", ")
                        ),
                        info.span,
                    ));
                }
            }
        };

        let target_sig = &self.model.functions[&target].signature;
        if let Err(errs) = info.signature.validate_shadow(target_sig) {
            let first = &errs[0];
            let span = first
                .param_index
                .and_then(|i| info.signature.params.get(i))
                .map(|p| p.span)
                .unwrap_or(info.span);
            return Err(SemanticError::new(first.message.clone(), span));
        }

        Ok(SpecFunction {
            name: info.name.clone(),
            span: info.span,
            target,
            callees,
            verify: attrs.verify,
            ignore_abort: attrs.ignore_abort,
        })
    }
}

fn function_kind(f: &FunDef) -> Result<FunctionKind, SemanticError> {
    if let Some(attr) = f.attrs.iter().find(|a| a.name.node == "spec") {
        let attrs = parse_spec_attr(attr)?;
        if f.body.is_none() {
            return Err(SemanticError::new("spec functions need a body", f.span));
        }
        return Ok(FunctionKind::Spec(attrs));
    }
    if prova_ast::has_attr(&f.attrs, "spec_only") {
        return Ok(FunctionKind::SpecHelper);
    }
    if f.is_native {
        return Ok(FunctionKind::Native);
    }
    Ok(FunctionKind::Runtime)
}

fn parse_spec_attr(attr: &Attribute) -> Result<SpecAttrs, SemanticError> {
    let mut out = SpecAttrs::default();
    for arg in &attr.args {
        match arg {
            AttrArg::Flag(f) if f.node == "prove" => out.verify = true,
            AttrArg::Flag(f) if f.node == "ignore_abort" => out.ignore_abort = true,
            AttrArg::KeyValue { key, value } if key.node == "target" => {
                out.target = Some(path_to_string(value));
            }
            AttrArg::Flag(f) | AttrArg::KeyValue { key: f, .. } => {
                return Err(SemanticError::new(format!("unknown spec option `{}`", f.node), f.span));
            }
        }
    }
    Ok(out)
}

/// Root identifier of a place expression (`x`, `x.f.g`, `&mut x.f`, `*x`).
pub fn place_root(e: &Expr) -> Option<&Ident> {
    match &e.kind {
        ExprKind::Path(p) if p.len() == 1 => Some(&p[0]),
        ExprKind::Field { base, .. } => place_root(base),
        ExprKind::Borrow { expr, .. } => place_root(expr),
        ExprKind::Unary { op: UnaryOp::Deref, expr } => place_root(expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &str) -> Result<SpecModel, SemanticError> {
        let m = prova_parse::parse_module(src).expect("parse");
        build_model(&m)
    }

    const HEADER: &str = r#"
    use prover::prover::{requires, ensures, old};
    public struct Pool has key { balance: u64, shares: u64 }
    const LIMIT: u64 = 10 * 1000;
    public fun withdraw(pool: &mut Pool, shares_in: u64): u64 {
        pool.shares = pool.shares - shares_in;
        shares_in
    }
    "#;

    fn module(body: &str) -> String {
        format!("module amm::pool {{ {HEADER} {body} }}")
    }

    #[test]
    fn spec_suffix_selects_target() {
        let m = build(&module(
            r#"
            #[spec(prove)]
            fun withdraw_spec(pool: &mut Pool, shares_in: u64): u64 {
                requires(shares_in <= pool.shares);
                let r = withdraw(pool, shares_in);
                ensures(r == shares_in);
                r
            }
            "#,
        ))
        .expect("model");
        assert_eq!(m.specs.len(), 1);
        assert_eq!(m.specs[0].target, "withdraw");
        assert!(m.specs[0].verify);
        assert!(!m.specs[0].ignore_abort);
        assert_eq!(m.consts["LIMIT"].value, ConstValue::Int(BigUint::from(10_000u32)));
    }

    #[test]
    fn u256_constants_wider_than_u128() {
        let m = build(&module(
            "const WIDE: u256 = 340282366920938463463374607431768211456 * 2; const DIFF: u256 = WIDE - 1;",
        ))
        .expect("model");
        let wide = BigUint::from(1u8) << 129u32;
        assert_eq!(m.consts["WIDE"].value, ConstValue::Int(wide.clone()));
        assert_eq!(m.consts["DIFF"].value, ConstValue::Int(wide - 1u8));

        let err = build(&module("const NARROW: u128 = 340282366920938463463374607431768211456;")).unwrap_err();
        assert!(err.message.contains("does not fit its type `u128`"), "{}", err.message);
        let err = build(&module("const NEG: u64 = 1 - 2;")).unwrap_err();
        assert!(err.message.contains("unsupported or overflowing"), "{}", err.message);
    }

    #[test]
    fn explicit_target_and_options() {
        let m = build(&module(
            r#"
            #[spec(prove, ignore_abort, target = amm::pool::withdraw)]
            fun check(p: &mut Pool, n: u64): u64 {
                withdraw(p, n)
            }
            "#,
        ))
        .expect("model");
        assert_eq!(m.specs[0].target, "withdraw");
        assert!(m.specs[0].ignore_abort);
    }

    #[test]
    fn signature_mismatch_is_rejected() {
        let err = build(&module(
            r#"
            #[spec(prove)]
            fun withdraw_spec(pool: &mut Pool, shares_in: u128): u64 {
                withdraw(pool, (shares_in as u64))
            }
            "#,
        ))
        .unwrap_err();
        assert!(err.message.contains("expects `u64`"), "{}", err.message);
    }

    #[test]
    fn snapshot_of_non_mut_param_is_rejected() {
        let err = build(&module(
            r#"
            #[spec(prove)]
            fun withdraw_spec(pool: &mut Pool, shares_in: u64): u64 {
                let old_n = old!(shares_in);
                withdraw(pool, shares_in)
            }
            "#,
        ))
        .unwrap_err();
        assert!(err.message.contains("&mut"), "{}", err.message);
    }

    #[test]
    fn runtime_code_cannot_use_spec_intrinsics() {
        let err = build(
            r#"
            module a::m {
                use prover::prover::requires;
                fun f(x: u64): u64 { requires(x > 0); x }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.message.contains("spec-only"), "{}", err.message);
    }

    #[test]
    fn runtime_code_cannot_call_spec_functions() {
        let err = build(&module(
            r#"
            #[spec]
            fun withdraw_spec(pool: &mut Pool, shares_in: u64): u64 { withdraw(pool, shares_in) }
            fun leak(pool: &mut Pool): u64 { withdraw_spec(pool, 1) }
            "#,
        ))
        .unwrap_err();
        assert!(err.message.contains("cannot be called"), "{}", err.message);
    }

    #[test]
    fn unimported_intrinsic_gets_a_hint() {
        let err = build(
            r#"
            module a::m {
                fun f(x: u64): u64 { x }
                #[spec(prove)]
                fun f_spec(x: u64): u64 { let r = f(x); ensures(r == x); r }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.message.contains("use prover::prover::ensures"), "{}", err.message);
    }

    #[test]
    fn ambiguous_target_is_rejected() {
        let err = build(
            r#"
            module a::m {
                fun f(x: u64): u64 { x }
                fun g(x: u64): u64 { x }
                #[spec(prove)]
                fun check(x: u64): u64 { let a = f(x); g(a) }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.message.contains("target"), "{}", err.message);
    }

    #[test]
    fn recursion_is_rejected() {
        let err = build(
            r#"
            module a::m {
                fun f(x: u64): u64 { if (x == 0) 0 else g(x - 1) }
                fun g(x: u64): u64 { f(x) }
            }
            "#,
        )
        .unwrap_err();
        assert!(err.message.contains("recursive"), "{}", err.message);
    }

    #[test]
    fn recursive_structs_are_rejected() {
        let err = build("module a::m { struct A { b: B } struct B { a: A } }").unwrap_err();
        assert!(err.message.contains("recursive struct"));
    }

    #[test]
    fn integer_in_runtime_signature_is_rejected() {
        let err = build("module a::m { fun f(x: Integer): u64 { 0 } }").unwrap_err();
        assert!(err.message.contains("spec-only"));
    }
}
