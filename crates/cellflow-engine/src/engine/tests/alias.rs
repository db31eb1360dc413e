//! Aliasing: two names bound to the same object share mutations. A
//! mutation through one alias taints readers of the other.

use super::common::*;
use cellflow_analysis::{Expr, Stmt, Target};

fn alias_host() -> Host {
    let mut host = Host::new();
    host.submit_at(
        "1",
        0,
        "a = [1]",
        cell(vec![Stmt::assign(
            0,
            Target::name("a"),
            Expr::List(vec![Expr::int(1)]),
        )]),
    );
    host.submit_at("2", 1, "b = a", cell(vec![assign_name(0, "b", "a")]));
    host.submit_at("3", 2, "a.append(2)", cell(vec![method_call(0, "a", "append", 2)]));
    host.submit_at("4", 3, "print(b)", cell(vec![print_stmt(0, "b")]));
    for id in ["1", "2", "3", "4"] {
        host.run(id);
    }
    host
}

#[test]
fn test_mutation_through_alias_taints_reader() {
    let mut host = alias_host();
    assert!(host.engine.classify().waiting_cells.is_empty());

    // Re-running the appender mutates `a`, and through the alias class,
    // `b` — so the reader of `b` goes out of date.
    host.run("3");

    let classification = host.engine.classify();
    assert_eq!(classification.waiting_cells, vec!["4"]);
    assert_eq!(classification.ready_cells, vec!["2"]);
    assert_eq!(classification.waiter_links["4"], vec!["2"]);
}

#[test]
fn test_alias_symbols_share_timestamp() {
    let mut host = alias_host();
    host.run("3");

    let store = host.engine.store();
    let scope = store.global_scope();
    let a = store.lookup(scope, "a").unwrap();
    let b = store.lookup(scope, "b").unwrap();
    // Conservative direction: the mutation bumps every member of the
    // equivalence class to the same tick.
    assert_eq!(store.symbol(a).defined_at, store.symbol(b).defined_at);
    assert!(store.aliases(a).contains(&b));
}

#[test]
fn test_rebinding_breaks_the_alias() {
    let mut host = alias_host();
    // b = [9] re-seats b on a fresh object; mutating a no longer taints b.
    host.submit(
        "2",
        "b = [9]",
        cell(vec![Stmt::assign(
            0,
            Target::name("b"),
            Expr::List(vec![Expr::int(9)]),
        )]),
    );
    host.run("2");
    host.run("4");
    host.run("3");

    let store = host.engine.store();
    let scope = store.global_scope();
    let a = store.lookup(scope, "a").unwrap();
    let b = store.lookup(scope, "b").unwrap();
    assert!(!store.aliases(a).contains(&b));
    assert!(store.symbol(b).defined_at < store.symbol(a).defined_at);
}
