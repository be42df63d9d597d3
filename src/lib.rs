//! Spend Simple - client-side sync core for shared group budgets.
//!
//! Keeps a local mirror of a group's budgets and expenses in step with a
//! remote store: optimistic edits with rollback, bounded retry on reads,
//! and a live expense list fed by the store's change notifications.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
