//! The basic stale/refresher split: edit an upstream cell, re-run it, and
//! the direct reader becomes the refresher while the transitive reader
//! waits on it.

use super::common::*;

#[test]
fn test_simple_stale() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.submit_at("3", 2, "print(y)", cell(vec![print_stmt(0, "y")]));
    host.run("1");
    host.run("2");
    host.run("3");

    // Everything fresh after the initial pass.
    let classification = host.engine.classify();
    assert!(classification.waiting_cells.is_empty());
    assert!(classification.ready_cells.is_empty());

    // Edit cell 1 and re-run it.
    host.submit("1", "x = 2", cell(vec![assign_lit(0, "x", 2)]));
    host.run("1");

    let classification = host.engine.classify();
    assert_eq!(classification.waiting_cells, vec!["3"]);
    assert_eq!(classification.ready_cells, vec!["2"]);
    assert_eq!(classification.waiter_links["3"], vec!["2"]);
    assert_eq!(classification.ready_maker_links["2"], vec!["3"]);
}

#[test]
fn test_reactive_chain_restores_freshness() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.submit_at("3", 2, "print(y)", cell(vec![print_stmt(0, "y")]));
    host.run("1");
    host.run("2");
    host.run("3");

    host.submit("1", "x = 2", cell(vec![assign_lit(0, "x", 2)]));
    host.run("1");

    // Drive the reactive chain to quiescence.
    let mut executed = Vec::new();
    while let Some(next) = host.engine.schedule_next(None) {
        executed.push(next.clone());
        host.run(&next);
        assert!(executed.len() <= 10, "reactive chain did not terminate");
    }
    assert_eq!(executed, vec!["2", "3"]);

    let classification = host.engine.classify();
    assert!(classification.waiting_cells.is_empty());
    assert!(classification.ready_cells.is_empty());
}

#[test]
fn test_cell_graph_links() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.run("1");
    host.run("2");

    let classification = host.engine.classify();
    assert_eq!(classification.cell_parents["2"], vec!["1"]);
    assert_eq!(classification.cell_children["1"], vec!["2"]);
    assert!(classification.cell_parents["1"].is_empty());
}
