//! Core domain types
//!
//! The orchestrator persists these; the client and CLI only read them back
//! through the DTOs.

pub mod execution;
pub mod mapping;
