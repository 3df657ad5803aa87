//! vmsync service library.
//!
//! Process configuration and the HTTP trigger surface for the sync service.
//! The binary in `main.rs` wires these onto the connectors and the
//! reconciliation engine.

pub mod config;
pub mod error;
pub mod routes;
