//! Front-end protocol round trips.

use std::collections::BTreeMap;

use super::common::*;
use crate::protocol::{CellMetadata, ClientRequest, ServerResponse};
use cellflow_common::{ExecMode, Settings};

fn metadata(index: u32, content: &str) -> CellMetadata {
    CellMetadata {
        index,
        content: content.to_string(),
        ..CellMetadata::default()
    }
}

#[test]
fn test_establish_round_trip() {
    let json = r#"{"type": "establish", "settings": {"exec_mode": "lazy"}}"#;
    let request: ClientRequest = serde_json::from_str(json).unwrap();

    let mut host = Host::new();
    let response = host.engine.handle_request(request);
    match response {
        ServerResponse::EstablishAck { settings } => {
            assert_eq!(settings.exec_mode, ExecMode::Lazy);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn test_compute_exec_schedule_reply_shape() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.submit_at("3", 2, "print(y)", cell(vec![print_stmt(0, "y")]));
    host.run("1");
    host.run("2");
    host.run("3");
    host.run("1");

    let mut meta = BTreeMap::new();
    meta.insert("1".to_string(), metadata(0, "x = 1"));
    meta.insert("2".to_string(), metadata(1, "y = x + 1"));
    meta.insert("3".to_string(), metadata(2, "print(y)"));

    let response = host.engine.handle_request(ClientRequest::ComputeExecSchedule {
        cell_metadata_by_id: meta,
        is_reactively_executing: false,
    });

    let ServerResponse::ExecSchedule(reply) = response else {
        panic!("expected exec schedule reply");
    };
    assert_eq!(reply.waiting_cells, vec!["3"]);
    assert_eq!(reply.ready_cells, vec!["2"]);
    assert_eq!(reply.waiter_links["3"], vec!["2"]);
    assert_eq!(reply.last_executed_cell_id.as_deref(), Some("1"));
    assert!(!reply.last_execution_was_error);
    assert_eq!(reply.scheduled_cells, vec!["2"]);

    // The reply serializes with snake_case tags and echoes settings.
    let json = serde_json::to_value(ServerResponse::ExecSchedule(reply)).unwrap();
    assert_eq!(json["type"], "exec_schedule");
    assert_eq!(json["exec_mode"], "reactive");
    assert_eq!(json["settings"]["exec_schedule"], "hybrid");
}

#[test]
fn test_peeking_does_not_consume_scheduler_state() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.run("1");
    host.run("2");
    host.run("1");

    let request = || ClientRequest::ComputeExecSchedule {
        cell_metadata_by_id: BTreeMap::new(),
        is_reactively_executing: false,
    };
    // Two identical peeks, same answer: the first did not mark "2" as
    // already scheduled.
    for _ in 0..2 {
        let ServerResponse::ExecSchedule(reply) = host.engine.handle_request(request()) else {
            panic!("expected exec schedule reply");
        };
        assert_eq!(reply.scheduled_cells, vec!["2"]);
    }
}

#[test]
fn test_content_change_marks_dirty_without_classification() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.run("1");

    let mut meta = BTreeMap::new();
    meta.insert("1".to_string(), metadata(0, "x = 2"));
    let response = host
        .engine
        .handle_request(ClientRequest::NotifyContentChanged {
            cell_metadata_by_id: meta,
        });
    assert!(matches!(response, ServerResponse::Ack));
    assert!(host.engine.cells().get_by_id("1").unwrap().dirty);
}

#[test]
fn test_markdown_cells_are_ignored() {
    let mut host = Host::new();
    let mut meta = BTreeMap::new();
    meta.insert(
        "md".to_string(),
        CellMetadata {
            index: 0,
            content: "# heading".to_string(),
            cell_type: crate::protocol::CellType::Markdown,
        },
    );
    host.engine.handle_request(ClientRequest::NotifyContentChanged {
        cell_metadata_by_id: meta,
    });
    assert!(host.engine.cells().get_by_id("md").is_none());
}

#[test]
fn test_reactivity_cleanup_resets_session() {
    let mut host = Host::new();
    host.submit_at("1", 0, "x = 1", cell(vec![assign_lit(0, "x", 1)]));
    host.submit_at("2", 1, "y = x + 1", cell(vec![assign_add(0, "y", "x", 1)]));
    host.run("1");
    host.run("2");
    host.run("1");

    assert_eq!(host.engine.schedule_next(None), Some("2".to_string()));
    // Without running it, the session considers "2" emitted.
    assert_eq!(host.engine.schedule_next(None), None);

    host.engine.handle_request(ClientRequest::ReactivityCleanup);
    assert_eq!(host.engine.schedule_next(None), Some("2".to_string()));
}
