//! # Ranktrail
//!
//! The binary crate's library half: the HTTP API, the CLI, and the runtime
//! configuration they share. Split out of `main.rs` so integration tests can
//! build a router against an in-memory tracker.

pub mod api;
pub mod cli;
pub mod config;
