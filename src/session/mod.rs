//! Session Manager (spec §4.8): per-thread session state and its lifecycle.

pub mod manager;
pub mod types;
