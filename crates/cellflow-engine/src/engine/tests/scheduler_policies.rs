//! Scheduling policies, flow order, and batch closures.

use super::common::*;
use cellflow_common::{ExecMode, ExecSchedule, FlowOrder, ReactivityMode, Settings};

use crate::engine::EngineConfig;

/// 1 defines `a`; 2 and 3 both read it. Cell 2 has run twice, cell 3
/// once, so the two policies disagree on who goes first.
fn fan_out_host(settings: Settings) -> Host {
    let mut host = Host::with_config(EngineConfig::default().with_settings(settings));
    host.submit_at("1", 0, "a = 1", cell(vec![assign_lit(0, "a", 1)]));
    host.submit_at("2", 1, "b = a", cell(vec![assign_name(0, "b", "a")]));
    host.submit_at("3", 2, "c = a", cell(vec![assign_name(0, "c", "a")]));
    host.run("1");
    host.run("2");
    host.run("3");
    host.run("2"); // exec_count: cell 2 = 2, cell 3 = 1
    host.run("1");
    host
}

#[test]
fn test_liveness_prefers_lowest_exec_count() {
    let settings = Settings {
        exec_schedule: ExecSchedule::LivenessBased,
        ..Settings::default()
    };
    let mut host = fan_out_host(settings);
    assert_eq!(host.engine.schedule_next(None), Some("3".to_string()));
}

#[test]
fn test_dag_prefers_document_order() {
    let settings = Settings {
        exec_schedule: ExecSchedule::DagBased,
        ..Settings::default()
    };
    let mut host = fan_out_host(settings);
    assert_eq!(host.engine.schedule_next(None), Some("2".to_string()));
}

#[test]
fn test_in_order_excludes_cells_above() {
    // The reader sits above the writer in the document.
    let settings = Settings {
        flow_order: FlowOrder::InOrder,
        ..Settings::default()
    };
    let mut host = Host::with_config(EngineConfig::default().with_settings(settings));
    host.submit_at("up", 0, "b = a", cell(vec![assign_name(0, "b", "a")]));
    host.submit_at("1", 1, "a = 1", cell(vec![assign_lit(0, "a", 1)]));
    host.run("1");
    host.run("up");
    host.run("1");

    assert_eq!(host.engine.schedule_next(None), None);

    // Same state, any-order: the upstream reader is eligible.
    host.engine.update_settings(Settings::default());
    host.engine.reactivity_cleanup();
    assert_eq!(host.engine.schedule_next(None), Some("up".to_string()));
}

#[test]
fn test_lazy_mode_never_schedules() {
    let settings = Settings {
        exec_mode: ExecMode::Lazy,
        ..Settings::default()
    };
    let mut host = fan_out_host(settings);
    assert_eq!(host.engine.schedule_next(None), None);
}

#[test]
fn test_batch_closure_covers_fan_out() {
    let settings = Settings {
        reactivity_mode: ReactivityMode::Batch,
        ..Settings::default()
    };
    let mut host = fan_out_host(settings);
    let schedule = host.engine.compute_schedule(None);
    let mut order = schedule.order.clone();
    order.sort();
    assert_eq!(order, vec!["2", "3"]);
    assert!(schedule.cycles.is_empty());
}

#[test]
fn test_pull_extends_closure_through_stale_parents() {
    let settings = Settings {
        pull_reactive_updates: true,
        ..Settings::default()
    };
    let mut host = Host::with_config(EngineConfig::default().with_settings(settings));
    host.submit_at("1", 0, "x = y + 1", cell(vec![assign_add(0, "x", "y", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.run("1");
    host.run("2");
    host.run("1");
    host.run("2");

    // Cell 1 is the promoted candidate; its parent (cell 2) is waiting
    // and gets pulled into the closure, closing the 2-cycle.
    let schedule = host.engine.compute_schedule(None);
    let mut order = schedule.order.clone();
    order.sort();
    assert_eq!(order, vec!["1", "2"]);
    assert_eq!(schedule.cycles.len(), 1);
}

#[test]
fn test_cousins_ride_along() {
    let settings = Settings {
        pull_reactive_updates: true,
        push_reactive_updates_to_cousins: true,
        ..Settings::default()
    };
    let mut host = Host::with_config(EngineConfig::default().with_settings(settings));
    host.submit_at("1", 0, "x = y + 1", cell(vec![assign_add(0, "x", "y", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.submit_at("3", 2, "w = y + 2", cell(vec![assign_add(0, "w", "y", 2)]));
    host.run("1");
    host.run("2");
    host.run("3");
    host.run("1");
    host.run("2");

    let schedule = host.engine.compute_schedule(None);
    // Cell 3 shares the waiting parent (cell 2) with cell 1, so the push
    // setting drags it in.
    assert!(schedule.order.contains(&"3".to_string()));
}
