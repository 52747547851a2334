#![forbid(unsafe_code)]

use prova_ast::{
    path_to_string, AttrArg, Attribute, BinOp, Block, ConstDef, Expr, ExprKind, FunDef, Item,
    Module, Program, Stmt, StructDef, TypeRef, TypeRefKind, UnaryOp, UseDecl, Visibility,
};

const INDENT: &str = "    ";

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for (i, m) in program.modules.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format_module(m));
    }
    out
}

pub fn format_module(module: &Module) -> String {
    let mut out = String::new();
    out.push_str("module ");
    out.push_str(&module.address.node);
    out.push_str("::");
    out.push_str(&module.name.node);
    out.push_str(" {\n");

    let mut prev_was_use = None;
    for item in &module.items {
        let is_use = matches!(item, Item::Use(_));
        // Blank line between items, except inside a run of `use` lines.
        if prev_was_use.is_some() && !(is_use && prev_was_use == Some(true)) {
            out.push('\n');
        }
        prev_was_use = Some(is_use);
        fmt_item(&mut out, 1, item);
    }

    out.push_str("}\n");
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, 0, expr, Prec::Lowest);
    out
}

pub fn format_type(ty: &TypeRef) -> String {
    let mut out = String::new();
    fmt_type_ref(&mut out, ty);
    out
}

fn fmt_item(out: &mut String, indent: usize, item: &Item) {
    match item {
        Item::Use(u) => fmt_use(out, indent, u),
        Item::Const(c) => fmt_const(out, indent, c),
        Item::Struct(s) => fmt_struct(out, indent, s),
        Item::Fun(f) => fmt_fun(out, indent, f),
    }
}

fn fmt_attrs(out: &mut String, indent: usize, attrs: &[Attribute]) {
    for a in attrs {
        indent_line(out, indent);
        out.push_str("#[");
        out.push_str(&a.name.node);
        if !a.args.is_empty() {
            out.push('(');
            for (i, arg) in a.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match arg {
                    AttrArg::Flag(f) => out.push_str(&f.node),
                    AttrArg::KeyValue { key, value } => {
                        out.push_str(&key.node);
                        out.push_str(" = ");
                        out.push_str(&path_to_string(value));
                    }
                }
            }
            out.push(')');
        }
        out.push_str("]\n");
    }
}

fn fmt_use(out: &mut String, indent: usize, u: &UseDecl) {
    fmt_attrs(out, indent, &u.attrs);
    indent_line(out, indent);
    out.push_str("use ");
    out.push_str(&path_to_string(&u.path));
    if let Some(members) = &u.members {
        out.push_str("::{");
        for (i, m) in members.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&m.name.node);
            if let Some(a) = &m.alias {
                out.push_str(" as ");
                out.push_str(&a.node);
            }
        }
        out.push('}');
    }
    if let Some(a) = &u.alias {
        out.push_str(" as ");
        out.push_str(&a.node);
    }
    out.push_str(";\n");
}

fn fmt_const(out: &mut String, indent: usize, c: &ConstDef) {
    fmt_attrs(out, indent, &c.attrs);
    indent_line(out, indent);
    out.push_str("const ");
    out.push_str(&c.name.node);
    out.push_str(": ");
    fmt_type_ref(out, &c.ty);
    out.push_str(" = ");
    fmt_expr(out, indent, &c.value, Prec::Lowest);
    out.push_str(";\n");
}

fn fmt_struct(out: &mut String, indent: usize, s: &StructDef) {
    fmt_attrs(out, indent, &s.attrs);
    indent_line(out, indent);
    if s.is_public {
        out.push_str("public ");
    }
    out.push_str("struct ");
    out.push_str(&s.name.node);
    fmt_type_params(out, &s.type_params);
    if !s.abilities.is_empty() {
        out.push_str(" has ");
        let abilities: Vec<&str> = s.abilities.iter().map(|a| a.node.as_str()).collect();
        out.push_str(&abilities.join(", "));
    }
    if s.fields.is_empty() {
        out.push_str(" {}\n");
        return;
    }
    out.push_str(" {\n");
    for f in &s.fields {
        indent_line(out, indent + 1);
        out.push_str(&f.name.node);
        out.push_str(": ");
        fmt_type_ref(out, &f.ty);
        out.push_str(",\n");
    }
    indent_line(out, indent);
    out.push_str("}\n");
}

fn fmt_fun(out: &mut String, indent: usize, f: &FunDef) {
    fmt_attrs(out, indent, &f.attrs);
    indent_line(out, indent);
    match f.visibility {
        Visibility::Private => {}
        Visibility::Public => out.push_str("public "),
        Visibility::Package => out.push_str("public(package) "),
        Visibility::Entry => out.push_str("entry "),
    }
    if f.is_native {
        out.push_str("native ");
    }
    out.push_str("fun ");
    out.push_str(&f.name.node);
    fmt_type_params(out, &f.type_params);
    out.push('(');
    for (i, p) in f.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&p.name.node);
        out.push_str(": ");
        fmt_type_ref(out, &p.ty);
    }
    out.push(')');
    if let Some(ret) = &f.ret {
        out.push_str(": ");
        fmt_type_ref(out, ret);
    }
    match &f.body {
        Some(body) => {
            out.push(' ');
            fmt_brace_block(out, indent, body);
            out.push('\n');
        }
        None => out.push_str(";\n"),
    }
}

fn fmt_type_params(out: &mut String, params: &[prova_ast::Ident]) {
    if params.is_empty() {
        return;
    }
    out.push('<');
    let names: Vec<&str> = params.iter().map(|p| p.node.as_str()).collect();
    out.push_str(&names.join(", "));
    out.push('>');
}

fn fmt_stmt(out: &mut String, indent: usize, stmt: &Stmt) {
    match stmt {
        Stmt::Use(u) => fmt_use(out, indent, u),
        Stmt::Let(l) => {
            indent_line(out, indent);
            out.push_str("let ");
            if l.mutable {
                out.push_str("mut ");
            }
            out.push_str(&l.name.node);
            if let Some(ty) = &l.ty {
                out.push_str(": ");
                fmt_type_ref(out, ty);
            }
            out.push_str(" = ");
            fmt_expr(out, indent, &l.expr, Prec::Lowest);
            out.push_str(";\n");
        }
        Stmt::Assign(a) => {
            indent_line(out, indent);
            fmt_expr(out, indent, &a.target, Prec::Lowest);
            out.push_str(" = ");
            fmt_expr(out, indent, &a.expr, Prec::Lowest);
            out.push_str(";\n");
        }
        Stmt::Expr(e) => {
            indent_line(out, indent);
            fmt_expr(out, indent, e, Prec::Lowest);
            out.push_str(";\n");
        }
    }
}

fn fmt_type_ref(out: &mut String, t: &TypeRef) {
    match &t.kind {
        TypeRefKind::Unit => out.push_str("()"),
        TypeRefKind::Ref { mutable, inner } => {
            out.push('&');
            if *mutable {
                out.push_str("mut ");
            }
            fmt_type_ref(out, inner);
        }
        TypeRefKind::Named { path, args } => {
            out.push_str(&path_to_string(path));
            if !args.is_empty() {
                out.push('<');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    fmt_type_ref(out, a);
                }
                out.push('>');
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Implies,
    Or,
    And,
    Cmp,
    Add,
    Mul,
    Unary,
    Postfix,
}

fn bin_prec(op: &BinOp) -> Prec {
    match op {
        BinOp::Implies => Prec::Implies,
        BinOp::Or => Prec::Or,
        BinOp::And => Prec::And,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => Prec::Cmp,
        BinOp::Add | BinOp::Sub => Prec::Add,
        BinOp::Mul | BinOp::Div | BinOp::Mod => Prec::Mul,
    }
}

fn needs_parens(parent: Prec, child: Prec) -> bool {
    child < parent
}

fn fmt_type_args(out: &mut String, args: &[TypeRef]) {
    if args.is_empty() {
        return;
    }
    out.push('<');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_type_ref(out, a);
    }
    out.push('>');
}

fn fmt_args(out: &mut String, indent: usize, args: &[Expr]) {
    out.push('(');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_expr(out, indent, a, Prec::Lowest);
    }
    out.push(')');
}

fn fmt_expr(out: &mut String, indent: usize, expr: &Expr, parent_prec: Prec) {
    match &expr.kind {
        ExprKind::Unit => out.push_str("()"),
        ExprKind::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprKind::IntLit { value, suffix } => {
            out.push_str(&value.to_string());
            if let Some(s) = suffix {
                out.push_str(s);
            }
        }
        ExprKind::Path(p) => out.push_str(&path_to_string(p)),
        ExprKind::Unary { op, expr: inner } => {
            let my = Prec::Unary;
            let parens = needs_parens(parent_prec, my);
            if parens {
                out.push('(');
            }
            out.push(match op {
                UnaryOp::Neg => '-',
                UnaryOp::Not => '!',
                UnaryOp::Deref => '*',
            });
            fmt_expr(out, indent, inner, my);
            if parens {
                out.push(')');
            }
        }
        ExprKind::Borrow { mutable, expr: inner } => {
            let my = Prec::Unary;
            let parens = needs_parens(parent_prec, my);
            if parens {
                out.push('(');
            }
            out.push_str(if *mutable { "&mut " } else { "&" });
            fmt_expr(out, indent, inner, my);
            if parens {
                out.push(')');
            }
        }
        ExprKind::Binary { left, op, right } => {
            let my = bin_prec(op);
            let parens = needs_parens(parent_prec, my);
            if parens {
                out.push('(');
            }
            // Implication is right-associative, comparisons do not chain.
            let (lp, rp) = if *op == BinOp::Implies {
                (next_prec(my), my)
            } else if op.is_cmp() {
                (next_prec(my), next_prec(my))
            } else {
                (my, next_prec(my))
            };
            fmt_expr(out, indent, left, lp);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_expr(out, indent, right, rp);
            if parens {
                out.push(')');
            }
        }
        ExprKind::Cast { expr: inner, ty } => {
            out.push('(');
            fmt_expr(out, indent, inner, Prec::Lowest);
            out.push_str(" as ");
            fmt_type_ref(out, ty);
            out.push(')');
        }
        ExprKind::Field { base, field } => {
            fmt_expr(out, indent, base, Prec::Postfix);
            out.push('.');
            out.push_str(&field.node);
        }
        ExprKind::Call {
            callee,
            type_args,
            args,
        } => {
            out.push_str(&path_to_string(callee));
            fmt_type_args(out, type_args);
            fmt_args(out, indent, args);
        }
        ExprKind::MethodCall {
            receiver,
            method,
            type_args,
            args,
        } => {
            fmt_expr(out, indent, receiver, Prec::Postfix);
            out.push('.');
            out.push_str(&method.node);
            fmt_type_args(out, type_args);
            fmt_args(out, indent, args);
        }
        ExprKind::MacroCall { name, args } => {
            out.push_str(&name.node);
            out.push('!');
            fmt_args(out, indent, args);
        }
        ExprKind::Pack {
            name,
            type_args,
            fields,
        } => {
            out.push_str(&path_to_string(name));
            fmt_type_args(out, type_args);
            if fields.is_empty() {
                out.push_str(" {}");
                return;
            }
            out.push_str(" { ");
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&k.node);
                out.push_str(": ");
                fmt_expr(out, indent, v, Prec::Lowest);
            }
            out.push_str(" }");
        }
        ExprKind::If {
            cond,
            then_block,
            else_block,
        } => {
            let parens = parent_prec > Prec::Lowest;
            if parens {
                out.push('(');
            }
            out.push_str("if (");
            fmt_expr(out, indent, cond, Prec::Lowest);
            out.push_str(") ");
            fmt_brace_block(out, indent, then_block);
            if let Some(b) = else_block {
                out.push_str(" else ");
                fmt_brace_block(out, indent, b);
            }
            if parens {
                out.push(')');
            }
        }
        ExprKind::Block(b) => fmt_brace_block(out, indent, b),
        ExprKind::Abort(code) => {
            let parens = parent_prec > Prec::Lowest;
            if parens {
                out.push('(');
            }
            out.push_str("abort ");
            fmt_expr(out, indent, code, Prec::Lowest);
            if parens {
                out.push(')');
            }
        }
    }
}

fn next_prec(p: Prec) -> Prec {
    match p {
        Prec::Lowest => Prec::Implies,
        Prec::Implies => Prec::Or,
        Prec::Or => Prec::And,
        Prec::And => Prec::Cmp,
        Prec::Cmp => Prec::Add,
        Prec::Add => Prec::Mul,
        Prec::Mul => Prec::Unary,
        Prec::Unary | Prec::Postfix => Prec::Postfix,
    }
}

fn fmt_brace_block(out: &mut String, indent: usize, block: &Block) {
    out.push_str("{\n");
    for stmt in &block.stmts {
        fmt_stmt(out, indent + 1, stmt);
    }
    if let Some(expr) = &block.tail {
        indent_line(out, indent + 1);
        fmt_expr(out, indent + 1, expr, Prec::Lowest);
        out.push('\n');
    }
    indent_line(out, indent);
    out.push('}');
}

fn indent_line(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_idempotent(src: &str) {
        let program = crate::parse_source(src).unwrap();
        let formatted1 = format_program(&program);
        let program2 = crate::parse_source(&formatted1).unwrap();
        let formatted2 = format_program(&program2);
        assert_eq!(formatted1, formatted2);
    }

    #[test]
    fn fmt_roundtrip_module() {
        is_idempotent(
            r#"
module amm::pool {
    use prover::prover::{requires, ensures};
    const MAX: u64 = 10000;
    public struct Pool has key { balance: u64, shares: u64 }
    public fun withdraw(pool: &mut Pool, shares_in: u64): u64 {
        let amount = ((shares_in as u128) * (pool.balance as u128) / (pool.shares as u128) as u64);
        pool.balance = pool.balance - amount;
        if (amount > MAX) { abort 1 };
        amount
    }
}
"#,
        );
    }

    #[test]
    fn fmt_expr_keeps_needed_parens() {
        let e = crate::parse_expr("(a + b) * c").unwrap();
        assert_eq!(format_expr(&e), "(a + b) * c");
        let e = crate::parse_expr("a - (b - c)").unwrap();
        assert_eq!(format_expr(&e), "a - (b - c)");
        let e = crate::parse_expr("(a ==> b) ==> c").unwrap();
        assert_eq!(format_expr(&e), "(a ==> b) ==> c");
        let e = crate::parse_expr("a ==> b ==> c").unwrap();
        assert_eq!(format_expr(&e), "a ==> b ==> c");
    }

    #[test]
    fn fmt_generic_calls_and_methods() {
        let e = crate::parse_expr("*global<LargeWithdrawEvent, bool>()").unwrap();
        assert_eq!(format_expr(&e), "*global<LargeWithdrawEvent, bool>()");
        let e = crate::parse_expr("x.to_int().mul(y.to_int()).lte(z)").unwrap();
        assert_eq!(format_expr(&e), "x.to_int().mul(y.to_int()).lte(z)");
    }
}
