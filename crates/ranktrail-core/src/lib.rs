//! # ranktrail-core
//!
//! Advancement rules and record keeping for Ranktrail - THE LOGIC.
//!
//! This crate tracks youth members' progress against a fixed curriculum of
//! ranked requirements: when a time-bound requirement becomes eligible, which
//! requirements to work on next, and who signed off on what.
//!
//! ## Layout
//!
//! - `types` → records, identifiers and `TrackerError`
//! - `eligibility` → eligibility date arithmetic (pure)
//! - `next_steps` → next-step priority ranking (pure)
//! - `store` / `storage` → the `TrackerStore` trait, in-memory and redb backends
//! - `tracker` → validated, audited record operations
//! - `dashboard` → read-only member and leader views
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Deterministic: `BTreeMap` only, no floats, the caller supplies "now"
//! - Every mutation is written together with its audit entry

// =============================================================================
// MODULES
// =============================================================================

pub mod dashboard;
pub mod eligibility;
pub mod next_steps;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Approval, ApprovalRequest, AuditAction, AuditEntry, AuditId, LeaderLink, LinkStatus,
    LoginSession, Member, MemberId, Note, NoteId, ProgressId, ProgressRecord, Rank, Requirement,
    RequirementId, Role, Subtask, SubtaskId, SubtaskProgress, TrackerError, User, UserId,
    infer_initials,
};

// =============================================================================
// RE-EXPORTS: Algorithms
// =============================================================================

pub use eligibility::{add_days, add_months, compute_eligibility, days_remaining, subtract_months};
pub use next_steps::{NextStep, ProgressEntry, rank_next_steps, rank_next_steps_with_limit};

// =============================================================================
// RE-EXPORTS: Records & Storage
// =============================================================================

pub use dashboard::{
    FeedNote, LeaderDashboard, MemberDashboard, PendingApproval, PersonSummary, RankPanel,
    RequirementStatus, SubtaskStatus, leader_dashboard, member_dashboard, next_steps_for,
};
pub use storage::RedbStore;
pub use store::{MemoryStore, TrackerStore};
pub use tracker::{
    NewMember, NewRequirement, NewSubtask, NewUser, ProgressUpdate, SessionLookup, StorageBackend,
    Tracker, TrackerStats, normalize_email,
};
