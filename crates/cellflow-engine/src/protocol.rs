//! Front-end protocol: JSON messages over the notebook UI channel.
//!
//! Requests are externally tagged with a `type` field; unknown or missing
//! optional payload fields fall back to defaults so older front-ends keep
//! working.

use std::collections::BTreeMap;

use cellflow_common::{ExecMode, ExecSchedule, FlowOrder, Highlights, ReactivityMode, Settings};
use serde::{Deserialize, Serialize};

use crate::engine::FlowEngine;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    #[default]
    Code,
    Markdown,
    Raw,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CellMetadata {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub cell_type: CellType,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Establish {
        #[serde(default)]
        settings: Settings,
    },
    ChangeActiveCell {
        active_cell_id: String,
        #[serde(default)]
        active_cell_order_idx: u32,
    },
    ComputeExecSchedule {
        #[serde(default)]
        cell_metadata_by_id: BTreeMap<String, CellMetadata>,
        #[serde(default)]
        is_reactively_executing: bool,
    },
    ReactivityCleanup,
    NotifyContentChanged {
        #[serde(default)]
        cell_metadata_by_id: BTreeMap<String, CellMetadata>,
    },
    UpdateSettings {
        settings: Settings,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecScheduleReply {
    pub waiting_cells: Vec<String>,
    pub ready_cells: Vec<String>,
    pub new_ready_cells: Vec<String>,
    pub forced_reactive_cells: Vec<String>,
    pub waiter_links: BTreeMap<String, Vec<String>>,
    pub ready_maker_links: BTreeMap<String, Vec<String>>,
    pub cell_parents: BTreeMap<String, Vec<String>>,
    pub cell_children: BTreeMap<String, Vec<String>>,
    pub exec_mode: ExecMode,
    pub flow_order: FlowOrder,
    pub exec_schedule: ExecSchedule,
    pub highlights: Highlights,
    /// Cells the scheduler wants run next: at most one in incremental
    /// mode, the whole closure in batch mode.
    pub scheduled_cells: Vec<String>,
    pub last_executed_cell_id: Option<String>,
    pub last_execution_was_error: bool,
    pub settings: Settings,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    EstablishAck { settings: Settings },
    Ack,
    ExecSchedule(ExecScheduleReply),
}

impl FlowEngine {
    /// Service one front-end request.
    pub fn handle_request(&mut self, request: ClientRequest) -> ServerResponse {
        match request {
            ClientRequest::Establish { settings } => {
                self.update_settings(settings);
                ServerResponse::EstablishAck {
                    settings: self.settings().clone(),
                }
            }
            ClientRequest::UpdateSettings { settings } => {
                self.update_settings(settings);
                ServerResponse::EstablishAck {
                    settings: self.settings().clone(),
                }
            }
            ClientRequest::ChangeActiveCell {
                active_cell_id,
                active_cell_order_idx,
            } => {
                self.change_active_cell(&active_cell_id, active_cell_order_idx);
                ServerResponse::Ack
            }
            ClientRequest::ReactivityCleanup => {
                self.reactivity_cleanup();
                ServerResponse::Ack
            }
            ClientRequest::NotifyContentChanged { cell_metadata_by_id } => {
                self.apply_metadata(&cell_metadata_by_id);
                ServerResponse::Ack
            }
            ClientRequest::ComputeExecSchedule {
                cell_metadata_by_id,
                is_reactively_executing,
            } => {
                self.apply_metadata(&cell_metadata_by_id);
                ServerResponse::ExecSchedule(self.exec_schedule_reply(is_reactively_executing))
            }
        }
    }

    fn apply_metadata(&mut self, metadata: &BTreeMap<String, CellMetadata>) {
        for (id, meta) in metadata {
            if meta.cell_type != CellType::Code {
                continue;
            }
            self.set_cell_order(id, meta.index);
            self.notify_content_changed(id, &meta.content);
        }
    }

    fn exec_schedule_reply(&mut self, is_reactively_executing: bool) -> ExecScheduleReply {
        let classification = self.classify();
        let settings = self.settings().clone();

        let scheduled_cells = if settings.exec_mode == ExecMode::Reactive {
            match settings.reactivity_mode {
                ReactivityMode::Batch => {
                    self.peek_or_commit_schedule(is_reactively_executing, |engine| {
                        engine.compute_schedule(None).order
                    })
                }
                ReactivityMode::Incremental => {
                    self.peek_or_commit_schedule(is_reactively_executing, |engine| {
                        engine.schedule_next(None).into_iter().collect()
                    })
                }
            }
        } else {
            Vec::new()
        };

        let to_btree = |map: rustc_hash::FxHashMap<String, Vec<String>>| {
            map.into_iter().collect::<BTreeMap<_, _>>()
        };

        ExecScheduleReply {
            waiting_cells: classification.waiting_cells,
            ready_cells: classification.ready_cells,
            new_ready_cells: classification.new_ready_cells,
            forced_reactive_cells: classification.forced_reactive_cells,
            waiter_links: to_btree(classification.waiter_links),
            ready_maker_links: to_btree(classification.ready_maker_links),
            cell_parents: to_btree(classification.cell_parents),
            cell_children: to_btree(classification.cell_children),
            exec_mode: settings.exec_mode,
            flow_order: settings.flow_order,
            exec_schedule: settings.exec_schedule,
            highlights: settings.highlights,
            scheduled_cells,
            last_executed_cell_id: self.last_executed_cell().map(str::to_string),
            last_execution_was_error: self.last_execution_was_error(),
            settings,
        }
    }

    /// A reply outside an active reactive chain must not consume scheduler
    /// state: the same schedule is re-derivable until something executes.
    fn peek_or_commit_schedule<F>(&mut self, commit: bool, f: F) -> Vec<String>
    where
        F: FnOnce(&mut FlowEngine) -> Vec<String>,
    {
        if commit {
            return f(self);
        }
        let saved = self.session_snapshot();
        let out = f(self);
        self.restore_session(saved);
        out
    }
}
