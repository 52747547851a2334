#![forbid(unsafe_code)]

//! The compiled view of a module: everything the host compiler would see once spec code is gone.

use prova_ast::{has_attr, Block, Expr, ExprKind, Item, Module, Stmt};

use crate::scope::{Intrinsic, Scope};

/// Remove spec functions, `#[spec_only]` items, prover imports and ghost writes.
pub fn erase_spec(module: &Module) -> Module {
    let mut scope = Scope::default();
    for item in &module.items {
        if let Item::Use(u) = item {
            scope.add_use(u);
        }
    }

    let items = module
        .items
        .iter()
        .filter(|item| match item {
            Item::Use(u) => !Scope::is_prover_import(u),
            Item::Fun(f) => !has_attr(&f.attrs, "spec") && !has_attr(&f.attrs, "spec_only"),
            Item::Struct(s) => !has_attr(&s.attrs, "spec_only"),
            Item::Const(c) => !has_attr(&c.attrs, "spec_only"),
        })
        .cloned()
        .map(|item| match item {
            Item::Fun(mut f) => {
                if let Some(body) = f.body.take() {
                    let mut local = scope.clone();
                    for u in prova_ast::block_uses(&body) {
                        local.add_use(u);
                    }
                    f.body = Some(erase_block(body, &local));
                }
                Item::Fun(f)
            }
            other => other,
        })
        .collect();

    Module {
        span: module.span,
        address: module.address.clone(),
        name: module.name.clone(),
        items,
    }
}

fn erase_block(block: Block, scope: &Scope) -> Block {
    let stmts = block
        .stmts
        .into_iter()
        .filter_map(|stmt| match stmt {
            Stmt::Use(u) if Scope::is_prover_import(&u) => None,
            Stmt::Expr(e) if is_ghost_write(&e, scope) => None,
            Stmt::Expr(e) => Some(Stmt::Expr(erase_expr(e, scope))),
            Stmt::Let(mut l) => {
                l.expr = erase_expr(l.expr, scope);
                Some(Stmt::Let(l))
            }
            Stmt::Assign(mut a) => {
                a.expr = erase_expr(a.expr, scope);
                Some(Stmt::Assign(a))
            }
            other => Some(other),
        })
        .collect();

    let tail = match block.tail {
        Some(t) if is_ghost_write(&t, scope) => None,
        Some(t) => Some(Box::new(erase_expr(*t, scope))),
        None => None,
    };

    Block {
        span: block.span,
        stmts,
        tail,
    }
}

fn erase_expr(expr: Expr, scope: &Scope) -> Expr {
    let kind = match expr.kind {
        ExprKind::If {
            cond,
            then_block,
            else_block,
        } => ExprKind::If {
            cond,
            then_block: erase_block(then_block, scope),
            else_block: else_block.map(|b| erase_block(b, scope)),
        },
        ExprKind::Block(b) => ExprKind::Block(erase_block(b, scope)),
        other => other,
    };
    Expr { span: expr.span, kind }
}

fn is_ghost_write(expr: &Expr, scope: &Scope) -> bool {
    matches!(&expr.kind, ExprKind::Call { callee, .. } if scope.intrinsic(callee) == Some(Intrinsic::GhostSet))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"
    module amm::pool {
        use prover::prover::{requires, ensures};
        use prover::ghost;
        use sui::event;

        public struct Pool has key { balance: u64 }
        public struct Big has copy, drop {}

        public fun withdraw(pool: &mut Pool, n: u64): u64 {
            if (n >= 10000) {
                ghost::set<Big, bool>(&true);
                event::emit(Big {});
            };
            pool.balance = pool.balance - n;
            n
        }

        #[spec_only]
        fun total(pool: &Pool): u64 { pool.balance }

        #[spec(prove)]
        fun withdraw_spec(pool: &mut Pool, n: u64): u64 {
            requires(n <= pool.balance);
            let r = withdraw(pool, n);
            ensures(r == n);
            r
        }
    }
    "#;

    #[test]
    fn compiled_view_has_no_spec_code() {
        let module = prova_parse::parse_module(SRC).unwrap();
        let erased = erase_spec(&module);
        let text = prova_parse::format_module(&erased);

        assert!(!text.contains("withdraw_spec"));
        assert!(!text.contains("prover"));
        assert!(!text.contains("ghost::set"));
        assert!(!text.contains("fun total"));
        assert!(text.contains("event::emit(Big {})"));
        assert!(text.contains("pool.balance = pool.balance - n;"));

        // The erased module is still a well-formed runtime module.
        let reparsed = prova_parse::parse_module(&text).unwrap();
        crate::build_model(&reparsed).unwrap();
    }
}
