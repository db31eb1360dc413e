//! Front-end facing settings.
//!
//! Wire names are `snake_case` and match the notebook extension's payloads.

use serde::{Deserialize, Serialize};

/// Whether downstream cells are auto-scheduled after each run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    #[default]
    Reactive,
    Lazy,
}

/// Which cells are eligible for scheduling relative to document position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowOrder {
    InOrder,
    #[default]
    AnyOrder,
}

/// Scheduling policy for picking the next reactive cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecSchedule {
    LivenessBased,
    DagBased,
    #[default]
    Hybrid,
}

/// Whether a reactive session schedules the whole closure at once or one
/// cell at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactivityMode {
    Batch,
    #[default]
    Incremental,
}

/// Which cells carry UI hints in the schedule reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Highlights {
    #[default]
    All,
    None,
    Executed,
    Reactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub exec_mode: ExecMode,
    pub flow_order: FlowOrder,
    pub exec_schedule: ExecSchedule,
    pub reactivity_mode: ReactivityMode,
    pub highlights: Highlights,
    pub pull_reactive_updates: bool,
    pub push_reactive_updates_to_cousins: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exec_mode: ExecMode::Reactive,
            flow_order: FlowOrder::AnyOrder,
            exec_schedule: ExecSchedule::Hybrid,
            reactivity_mode: ReactivityMode::Incremental,
            highlights: Highlights::All,
            pull_reactive_updates: false,
            push_reactive_updates_to_cousins: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let s = Settings {
            exec_mode: ExecMode::Lazy,
            flow_order: FlowOrder::InOrder,
            exec_schedule: ExecSchedule::DagBased,
            ..Settings::default()
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["exec_mode"], "lazy");
        assert_eq!(json["flow_order"], "in_order");
        assert_eq!(json["exec_schedule"], "dag_based");
        assert_eq!(json["highlights"], "all");
    }

    #[test]
    fn test_partial_payload_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{"exec_mode": "lazy"}"#).unwrap();
        assert_eq!(s.exec_mode, ExecMode::Lazy);
        assert_eq!(s.exec_schedule, ExecSchedule::Hybrid);
        assert!(!s.pull_reactive_updates);
    }
}
