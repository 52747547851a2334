#![forbid(unsafe_code)]

use miette::SourceSpan;
use num::BigUint;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let a0: usize = a.offset();
    let b0: usize = b.offset();
    let start = a0.min(b0);
    let end = (a0 + a.len()).max(b0 + b.len());
    span_between(start, end)
}

pub type Ident = Spanned<String>;

/// A `::`-separated path such as `prover::ghost::global`.
pub type Path = Vec<Ident>;

pub fn path_to_string(path: &[Ident]) -> String {
    path.iter()
        .map(|p| p.node.as_str())
        .collect::<Vec<_>>()
        .join("::")
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub modules: Vec<Module>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub span: Span,
    pub address: Ident,
    pub name: Ident,
    pub items: Vec<Item>,
}

impl Module {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.address.node, self.name.node)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunDef> {
        self.items.iter().filter_map(|i| match i {
            Item::Fun(f) => Some(f),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.items.iter().filter_map(|i| match i {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Use(UseDecl),
    Const(ConstDef),
    Struct(StructDef),
    Fun(FunDef),
}

/// `#[name]`, `#[name(arg, key = path)]`
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub span: Span,
    pub name: Ident,
    pub args: Vec<AttrArg>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttrArg {
    Flag(Ident),
    KeyValue { key: Ident, value: Path },
}

pub fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|a| a.name.node == name)
}

/// `use a::b;`, `use a::b as c;`, `use a::b::{c, d as e, Self};`
#[derive(Clone, Debug, PartialEq)]
pub struct UseDecl {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub path: Path,
    pub alias: Option<Ident>,
    pub members: Option<Vec<UseMember>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UseMember {
    pub name: Ident,
    pub alias: Option<Ident>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstDef {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub name: Ident,
    pub ty: TypeRef,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub is_public: bool,
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub abilities: Vec<Ident>,
    pub fields: Vec<FieldDef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
    /// `public(package)` / `public(friend)`
    Package,
    Entry,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunDef {
    pub span: Span,
    pub attrs: Vec<Attribute>,
    pub visibility: Visibility,
    pub is_native: bool,
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub params: Vec<Param>,
    pub ret: Option<TypeRef>,
    /// `None` for `native fun`.
    pub body: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    pub kind: TypeRefKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeRefKind {
    Unit,
    Named { path: Path, args: Vec<TypeRef> },
    Ref { mutable: bool, inner: Box<TypeRef> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Use(UseDecl),
    Let(LetStmt),
    Assign(AssignStmt),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LetStmt {
    pub span: Span,
    pub mutable: bool,
    pub name: Ident,
    pub ty: Option<TypeRef>,
    pub expr: Expr,
}

/// `place = expr;` where place is `x`, `x.f.g` or `*r`.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Expr,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Unit,
    BoolLit(bool),
    IntLit {
        value: BigUint,
        suffix: Option<String>,
    },
    /// Local, constant, or (as a callee) function path.
    Path(Path),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Borrow {
        mutable: bool,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    Field {
        base: Box<Expr>,
        field: Ident,
    },
    Call {
        callee: Path,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    /// `assert!(..)`, `old!(..)`
    MacroCall {
        name: Ident,
        args: Vec<Expr>,
    },
    /// `Name { field: value, ... }`
    Pack {
        name: Path,
        type_args: Vec<TypeRef>,
        fields: Vec<(Ident, Expr)>,
    },
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
    },
    Block(Block),
    Abort(Box<Expr>),
}

impl Expr {
    /// Expressions that may stand as statements without a trailing `;`.
    pub fn is_block_like(&self) -> bool {
        matches!(self.kind, ExprKind::If { .. } | ExprKind::Block(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Deref,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
    Implies,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "==>",
        }
    }

    pub fn is_arith(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_cmp(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

/// Visit every expression in a block (pre-order), including nested blocks.
pub fn walk_block_exprs<'a>(block: &'a Block, f: &mut dyn FnMut(&'a Expr)) {
    for s in &block.stmts {
        match s {
            Stmt::Use(_) => {}
            Stmt::Let(l) => walk_expr(&l.expr, f),
            Stmt::Assign(a) => {
                walk_expr(&a.target, f);
                walk_expr(&a.expr, f);
            }
            Stmt::Expr(e) => walk_expr(e, f),
        }
    }
    if let Some(t) = &block.tail {
        walk_expr(t, f);
    }
}

pub fn walk_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Unit | ExprKind::BoolLit(_) | ExprKind::IntLit { .. } | ExprKind::Path(_) => {}
        ExprKind::Unary { expr, .. }
        | ExprKind::Borrow { expr, .. }
        | ExprKind::Cast { expr, .. }
        | ExprKind::Abort(expr) => walk_expr(expr, f),
        ExprKind::Field { base, .. } => walk_expr(base, f),
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::Call { args, .. } | ExprKind::MacroCall { args, .. } => {
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            walk_expr(receiver, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::Pack { fields, .. } => {
            for (_, e) in fields {
                walk_expr(e, f);
            }
        }
        ExprKind::If {
            cond,
            then_block,
            else_block,
        } => {
            walk_expr(cond, f);
            walk_block_exprs(then_block, f);
            if let Some(b) = else_block {
                walk_block_exprs(b, f);
            }
        }
        ExprKind::Block(b) => walk_block_exprs(b, f),
    }
}

/// `use` declarations at the top of a function body.
pub fn block_uses(block: &Block) -> impl Iterator<Item = &UseDecl> {
    block.stmts.iter().filter_map(|s| match s {
        Stmt::Use(u) => Some(u),
        _ => None,
    })
}
