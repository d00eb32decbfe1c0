//! HTTP surface of the StreamBatch pipeline.
//!
//! The binary in `main.rs` wires configuration into an [`state::AppState`]
//! and serves [`api::create_router`]; integration tests drive the same
//! router in-process.

pub mod api;
pub mod metrics;
pub mod registry;
pub mod state;
