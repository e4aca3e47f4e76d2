//! # Persistent Storage
//!
//! Disk-backed implementations of [`crate::store::TrackerStore`].

pub mod redb_store;

pub use redb_store::RedbStore;
