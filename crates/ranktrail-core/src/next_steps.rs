//! # Next-Step Prioritizer
//!
//! Ranks a member's incomplete requirements and returns the few most worth
//! working on next.
//!
//! ## Priority Score
//!
//! Lower sorts first:
//!
//! ```text
//! rank_position * RANK_WEIGHT
//!   + (0 if time-bound else UNTIMED_PENALTY)
//!   + (IN_PROGRESS_WEIGHT if started and not completed else NOT_STARTED_WEIGHT)
//!   + sort_order
//! ```
//!
//! Equal scores keep input order.

use crate::primitives::{
    IN_PROGRESS_WEIGHT, NEXT_STEPS_LIMIT, NOT_STARTED_WEIGHT, RANK_WEIGHT, UNTIMED_PENALTY,
};
use crate::{ProgressRecord, Rank, Requirement, RequirementId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A requirement paired with the member's progress on it, if any.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEntry<'a> {
    pub requirement: &'a Requirement,
    pub progress: Option<&'a ProgressRecord>,
}

impl<'a> ProgressEntry<'a> {
    #[must_use]
    pub fn new(requirement: &'a Requirement, progress: Option<&'a ProgressRecord>) -> Self {
        Self {
            requirement,
            progress,
        }
    }

    /// Approved, completed and initialled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress.is_some_and(ProgressRecord::is_complete)
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.progress.is_some_and(ProgressRecord::is_in_progress)
    }

    /// Priority score for this entry. Lower is more urgent.
    #[must_use]
    pub fn priority(&self) -> i64 {
        let rank_term = i64::from(self.requirement.rank.position()) * RANK_WEIGHT;
        let duration_term = if self.requirement.has_duration() {
            0
        } else {
            UNTIMED_PENALTY
        };
        let started_term = if self.is_in_progress() {
            IN_PROGRESS_WEIGHT
        } else {
            NOT_STARTED_WEIGHT
        };

        rank_term + duration_term + started_term + i64::from(self.requirement.sort_order)
    }
}

/// One recommended requirement with display hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub requirement_id: RequirementId,
    pub code: String,
    pub title: String,
    pub rank: Rank,
    pub priority: i64,
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub eligible_at: Option<DateTime<Utc>>,
    pub messages: Vec<String>,
}

/// Rank incomplete entries and return the top `NEXT_STEPS_LIMIT`.
#[must_use]
pub fn rank_next_steps(entries: &[ProgressEntry<'_>]) -> Vec<NextStep> {
    rank_next_steps_with_limit(entries, NEXT_STEPS_LIMIT)
}

/// Rank incomplete entries and return at most `limit` of them.
#[must_use]
pub fn rank_next_steps_with_limit(entries: &[ProgressEntry<'_>], limit: usize) -> Vec<NextStep> {
    let mut candidates: Vec<(i64, &ProgressEntry<'_>)> = entries
        .iter()
        .filter(|entry| !entry.is_complete())
        .map(|entry| (entry.priority(), entry))
        .collect();

    // sort_by_key is stable, so ties keep input order.
    candidates.sort_by_key(|(priority, _)| *priority);

    candidates
        .into_iter()
        .take(limit)
        .map(|(priority, entry)| NextStep {
            requirement_id: entry.requirement.id,
            code: entry.requirement.code.clone(),
            title: entry.requirement.title.clone(),
            rank: entry.requirement.rank,
            priority,
            in_progress: entry.is_in_progress(),
            started_at: entry.progress.and_then(|p| p.started_at),
            eligible_at: entry.progress.and_then(|p| p.eligible_at),
            messages: step_messages(entry),
        })
        .collect()
}

fn step_messages(entry: &ProgressEntry<'_>) -> Vec<String> {
    let requirement = entry.requirement;
    let mut messages = Vec::new();

    if requirement.has_duration() {
        let mut parts = Vec::new();
        if let Some(months) = requirement.duration_months.filter(|m| *m > 0) {
            let plural = if months > 1 { "s" } else { "" };
            parts.push(format!("{} month{}", months, plural));
        }
        if let Some(days) = requirement.duration_days.filter(|d| *d > 0) {
            parts.push(format!("{}-day", days));
        }
        messages.push(format!(
            "Time-bound requirement ({}). Start early.",
            parts.join(" and ")
        ));
    }

    if let Some(dependency) = requirement
        .dependency_text
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        messages.push(dependency.to_string());
    }

    if entry.is_in_progress() {
        messages.push("Already started, finish to keep momentum.".to_string());
    } else {
        messages.push(format!("Next pending item in {}.", requirement.rank.title()));
    }

    messages
}

// =============================================================================
// TESTS
// =============================================================================
