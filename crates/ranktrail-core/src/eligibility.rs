//! # Eligibility Calculator
//!
//! Computes the earliest date a time-bound requirement may be marked complete.
//!
//! The same function backs both the preview shown while editing and the value
//! persisted on save, so the two can never disagree.
//!
//! ## Rules
//!
//! 1. No start date: nothing is computed.
//! 2. Months are applied first, with calendar arithmetic. A day-of-month that
//!    does not exist in the target month clamps to that month's last day
//!    (Jan 31 + 1 month = Feb 29 in a leap year).
//! 3. Days are then added as flat 24-hour periods.
//! 4. A manual override is used only when nothing was computed.
//!
//! Arithmetic saturates at the representable timestamp range instead of failing.

use chrono::{DateTime, Months, TimeDelta, Utc};

/// Compute the eligibility date for a progress record.
///
/// Zero or absent durations leave the start date unchanged.
#[must_use]
pub fn compute_eligibility(
    started_at: Option<DateTime<Utc>>,
    duration_days: Option<u32>,
    duration_months: Option<u32>,
    manual_override: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let computed = started_at.map(|start| {
        let mut candidate = start;

        if let Some(months) = duration_months.filter(|m| *m > 0) {
            candidate = add_months(candidate, months);
        }

        if let Some(days) = duration_days.filter(|d| *d > 0) {
            candidate = add_days(candidate, days);
        }

        candidate
    });

    computed.or(manual_override)
}

/// Add calendar months, clamping to the last day of the target month.
#[must_use]
pub fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Subtract calendar months, clamping to the last day of the target month.
#[must_use]
pub fn subtract_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Add whole 24-hour days.
#[must_use]
pub fn add_days(date: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole days left until `eligible_at`, or zero once it has passed.
#[must_use]
pub fn days_remaining(eligible_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = eligible_at.signed_duration_since(now);
    if remaining <= TimeDelta::zero() {
        return 0;
    }
    // Round partial days up so "eligible tomorrow" never reads as 0.
    let whole = remaining.num_days();
    if remaining > TimeDelta::days(whole) {
        whole + 1
    } else {
        whole
    }
}

// =============================================================================
// TESTS
// =============================================================================
