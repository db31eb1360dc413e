pub mod common;

mod alias;
mod cycle_detection;
mod protocol_messages;
mod scheduler_policies;
mod simple_stale;
