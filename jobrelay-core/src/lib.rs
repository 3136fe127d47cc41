//! Jobrelay Core
//!
//! Core types shared by the Jobrelay services.
//!
//! This crate contains:
//! - Domain types: job executions, their status machine and job mappings
//! - DTOs: the JSON shapes exchanged between orchestrator, client and CLI

pub mod domain;
pub mod dto;
