//! Data Transfer Objects for the HTTP surface
//!
//! These are the JSON bodies the orchestrator returns and the client decodes.
//! Field names follow the public API (camelCase), not the Rust domain types.

pub mod error;
pub mod job;
