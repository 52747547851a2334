#![allow(dead_code)]

use prova_verify::{verify_module, ModuleReport, ProverOptions, SpecReport};

pub fn prove(src: &str, opts: &ProverOptions) -> ModuleReport {
    let module = prova_parse::parse_module(src).expect("parse");
    verify_module(&module, opts).expect("pipeline")
}

pub fn prove_bounded(src: &str) -> ModuleReport {
    prove(src, &ProverOptions::default())
}

pub fn spec<'a>(report: &'a ModuleReport, name: &str) -> &'a SpecReport {
    report
        .spec(name)
        .unwrap_or_else(|| panic!("no spec `{name}` in {:?}", report.summary_lines()))
}

pub const POOL: &str = r#"
module amm::pool {
    use prover::prover::{requires, ensures, old};

    public struct Pool has key {
        balance: u64,
        shares: u64,
    }

    public fun withdraw(pool: &mut Pool, shares_in: u64): u64 {
        let amount = (((shares_in as u128) * (pool.balance as u128) / (pool.shares as u128)) as u64);
        pool.balance = pool.balance - amount;
        pool.shares = pool.shares - shares_in;
        amount
    }

    public fun withdraw_off_by_one(pool: &mut Pool, shares_in: u64): u64 {
        let amount = (((shares_in as u128) * (pool.balance as u128) / (pool.shares as u128)) as u64) + 1;
        pool.balance = pool.balance - amount;
        pool.shares = pool.shares - shares_in;
        amount
    }

    #[spec(prove)]
    fun withdraw_spec(pool: &mut Pool, shares_in: u64): u64 {
        requires(pool.balance == 100);
        requires(pool.shares == 100);
        requires(shares_in == 50);
        let old_pool = old!(pool);
        let amount = withdraw(pool, shares_in);
        ensures(amount == 50);
        ensures(amount.to_int().mul(old_pool.shares.to_int()) == shares_in.to_int().mul(old_pool.balance.to_int()));
        ensures(pool.balance == old_pool.balance - amount);
        ensures(pool.shares.to_int().mul(old_pool.balance.to_int()).lte(old_pool.shares.to_int().mul(pool.balance.to_int())));
        amount
    }

    #[spec(prove, target = withdraw_off_by_one)]
    fun withdraw_off_by_one_spec(pool: &mut Pool, shares_in: u64): u64 {
        requires(pool.balance == 100);
        requires(pool.shares == 100);
        requires(shares_in == 50);
        let old_pool = old!(pool);
        let amount = withdraw_off_by_one(pool, shares_in);
        ensures(amount.to_int().mul(old_pool.shares.to_int()) == shares_in.to_int().mul(old_pool.balance.to_int()));
        ensures(pool.shares.to_int().mul(old_pool.balance.to_int()).lte(old_pool.shares.to_int().mul(pool.balance.to_int())));
        amount
    }
}
"#;

pub fn vault(amount: u64, cmp: &str) -> String {
    format!(
        r#"
module amm::vault {{
    use prover::prover::{{requires, ensures}};
    use prover::ghost::{{declare_global, global}};
    use sui::event;

    public struct Vault has key {{
        balance: u64,
    }}

    public struct LargeWithdrawEvent has copy, drop {{
        amount: u64,
    }}

    const LARGE_WITHDRAW_THRESHOLD: u64 = 10000;

    public fun withdraw(vault: &mut Vault, amount: u64) {{
        vault.balance = vault.balance - amount;
        if (amount {cmp} LARGE_WITHDRAW_THRESHOLD) {{
            event::emit(LargeWithdrawEvent {{ amount }});
        }};
    }}

    #[spec(prove)]
    fun withdraw_spec(vault: &mut Vault, amount: u64) {{
        declare_global<LargeWithdrawEvent, bool>();
        requires(vault.balance == 20000);
        requires(amount == {amount});
        withdraw(vault, amount);
        if (amount >= LARGE_WITHDRAW_THRESHOLD) {{
            ensures(*global<LargeWithdrawEvent, bool>());
        }};
    }}
}}
"#
    )
}
