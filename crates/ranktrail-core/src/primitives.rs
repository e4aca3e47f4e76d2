//! # Tracker Primitives
//!
//! Hardcoded constants for the Ranktrail core.
//!
//! ## Groups
//!
//! 1. **Next-step weights**: the terms of the priority score.
//! 2. **Input limits**: bounds enforced before anything reaches storage.
//! 3. **Sessions**: login lifetime defaults.

// =============================================================================
// NEXT-STEP PRIORITY WEIGHTS
// =============================================================================

/// Multiplied by the rank position. Large enough that no combination of the
/// smaller terms lets a later rank overtake an earlier one.
pub const RANK_WEIGHT: i64 = 1000;

/// Added when a requirement has no waiting period.
/// Time-bound requirements come first so the clock can start early.
pub const UNTIMED_PENALTY: i64 = 300;

/// Added when work has started but is not completed.
pub const IN_PROGRESS_WEIGHT: i64 = 50;

/// Added when work has not started.
pub const NOT_STARTED_WEIGHT: i64 = 200;

/// Number of next steps shown to a member.
pub const NEXT_STEPS_LIMIT: usize = 3;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum waiting period in months (100 years).
pub const MAX_DURATION_MONTHS: u32 = 1200;

/// Maximum waiting period in days (100 years).
pub const MAX_DURATION_DAYS: u32 = 36_500;

/// Sort orders must stay below this so they never reach into the
/// in-progress/duration terms of the next rank.
pub const MAX_SORT_ORDER: i32 = 450;

/// Maximum length for note bodies and free-text progress notes.
pub const MAX_NOTE_LENGTH: usize = 4096;

/// Maximum length for names, codes, titles and similar short fields.
pub const MAX_FIELD_LENGTH: usize = 256;

// =============================================================================
// SESSIONS
// =============================================================================

/// Default login lifetime: seven days.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;
