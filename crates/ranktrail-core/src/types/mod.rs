//! # Core Type Definitions
//!
//! This module contains all record types for the Ranktrail tracker:
//! - Identifiers (`UserId`, `MemberId`, `RequirementId`, ...)
//! - Curriculum (`Rank`, `Requirement`, `Subtask`)
//! - People (`User`, `Role`, `Member`, `LeaderLink`)
//! - Progress (`ProgressRecord`, `Approval`, `ApprovalRequest`, `Note`, `SubtaskProgress`)
//! - Bookkeeping (`LoginSession`, `AuditEntry`)
//! - Error types (`TrackerError`)
//!
//! ## Encoding
//!
//! Records are persisted with postcard, which is not self-describing.
//! Stored types therefore avoid `skip_serializing_if` and untyped JSON values;
//! audit metadata is a `BTreeMap<String, String>`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Login account identifier.
    UserId
);
record_id!(
    /// Youth member identifier.
    MemberId
);
record_id!(
    /// Curriculum requirement identifier.
    RequirementId
);
record_id!(
    /// Requirement subtask identifier.
    SubtaskId
);
record_id!(
    /// Progress record identifier.
    ProgressId
);
record_id!(
    /// Note identifier.
    NoteId
);
record_id!(
    /// Audit log entry identifier.
    AuditId
);

// =============================================================================
// RANK
// =============================================================================

/// An ordered tier of the advancement curriculum.
///
/// Declaration order is the advancement order; `position()` is used as the
/// dominant term of next-step priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rank {
    Scout,
    Tenderfoot,
    SecondClass,
    FirstClass,
    Star,
    Life,
    Eagle,
}

impl Rank {
    /// Every rank, entry rank first.
    pub const ALL: [Rank; 7] = [
        Rank::Scout,
        Rank::Tenderfoot,
        Rank::SecondClass,
        Rank::FirstClass,
        Rank::Star,
        Rank::Life,
        Rank::Eagle,
    ];

    /// Zero-based position in the fixed rank sequence.
    #[must_use]
    pub const fn position(self) -> u32 {
        self as u32
    }

    /// Human-readable title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Rank::Scout => "Scout",
            Rank::Tenderfoot => "Tenderfoot",
            Rank::SecondClass => "Second Class",
            Rank::FirstClass => "First Class",
            Rank::Star => "Star",
            Rank::Life => "Life",
            Rank::Eagle => "Eagle",
        }
    }

    /// The rank that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Rank> {
        Self::ALL.get(self.position() as usize + 1).copied()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Rank {
    type Err = TrackerError;

    /// Accepts `SECOND_CLASS`, `second-class`, `Second Class` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Rank::ALL
            .into_iter()
            .find(|rank| {
                let title: String = rank
                    .title()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                title == normalized
            })
            .ok_or_else(|| TrackerError::InvalidInput(format!("Unknown rank: {}", s)))
    }
}

// =============================================================================
// USERS & MEMBERS
// =============================================================================

/// Role attached to a login account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A youth member tracking their own advancement.
    Member,
    /// A supervising adult who approves linked members' work.
    Leader,
    /// Full access, including link approval and the audit log.
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::Leader => "LEADER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MEMBER" | "SCOUT" => Ok(Role::Member),
            "LEADER" => Ok(Role::Leader),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(TrackerError::InvalidInput(format!("Unknown role: {}", s))),
        }
    }
}

/// A login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Always stored trimmed and lower-cased.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Initials used when signing approvals. Inferred from the name when absent.
    pub initials: Option<String>,
    pub role: Role,
    /// PHC-formatted password hash. Accounts without one cannot log in.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last".
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Initials to record on an approval.
    #[must_use]
    pub fn signing_initials(&self) -> String {
        infer_initials(&self.first_name, &self.last_name, self.initials.as_deref())
    }
}

/// Stored initials win when non-blank; otherwise the first letter of each name.
/// Always upper-cased.
#[must_use]
pub fn infer_initials(first_name: &str, last_name: &str, stored: Option<&str>) -> String {
    if let Some(stored) = stored.map(str::trim).filter(|s| !s.is_empty()) {
        return stored.to_uppercase();
    }

    let first = first_name.trim().chars().next();
    let last = last_name.trim().chars().next();
    first.into_iter().chain(last).collect::<String>().to_uppercase()
}

/// A youth member whose advancement is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub unit: Option<String>,
    pub council: Option<String>,
    pub current_rank: Rank,
    pub date_of_birth: Option<NaiveDate>,
    /// The login account of the member, if they have one.
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// State of a leader-member relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Pending,
    Approved,
}

/// Grants a leader authority over one member's progress records once approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderLink {
    pub leader_id: UserId,
    pub member_id: MemberId,
    pub status: LinkStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LeaderLink {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == LinkStatus::Approved
    }
}

// =============================================================================
// CURRICULUM
// =============================================================================

/// A single gradable task belonging to one rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    /// Unique curriculum code, e.g. `TF-2a`.
    pub code: String,
    pub title: String,
    pub rank: Rank,
    pub summary: Option<String>,
    /// Free-text prerequisite shown alongside next steps.
    pub dependency_text: Option<String>,
    pub duration_days: Option<u32>,
    pub duration_months: Option<u32>,
    /// Ordering key within the rank.
    pub sort_order: i32,
}

impl Requirement {
    /// True when a nonzero waiting period gates eligibility.
    #[must_use]
    pub fn has_duration(&self) -> bool {
        self.duration_days.unwrap_or(0) > 0 || self.duration_months.unwrap_or(0) > 0
    }
}

/// A checklist item under a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: SubtaskId,
    pub requirement_id: RequirementId,
    pub code: String,
    pub title: String,
    pub detail: Option<String>,
    pub sort_order: i32,
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Sign-off recorded by a leader.
///
/// Bundling the leader, timestamp and initials makes an approval without them
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub leader_id: UserId,
    pub approved_at: DateTime<Utc>,
    pub initials: String,
}

/// A member's request for a specific leader to review a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub leader_id: UserId,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

/// One member's status against one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: ProgressId,
    pub member_id: MemberId,
    pub requirement_id: RequirementId,
    pub started_at: Option<DateTime<Utc>>,
    pub eligible_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub approval: Option<Approval>,
    /// Comment left on approval, or the reason given on revocation.
    pub approval_comment: Option<String>,
    pub approval_request: Option<ApprovalRequest>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approval.is_some()
    }

    /// Approved, completed, and initialled: all three at once.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
            && self
                .approval
                .as_ref()
                .is_some_and(|a| !a.initials.trim().is_empty())
    }

    /// Work has started but has no completion date yet.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.started_at.is_some() && self.completed_at.is_none()
    }

    /// Awaiting review by the requested leader.
    #[must_use]
    pub fn is_pending_for(&self, leader_id: UserId) -> bool {
        !self.is_approved()
            && self
                .approval_request
                .as_ref()
                .is_some_and(|r| r.leader_id == leader_id)
    }

    /// Drop approval state and any pending request.
    pub fn clear_approval(&mut self) {
        self.approval = None;
        self.approval_comment = None;
        self.approval_request = None;
    }
}

/// Completion state of one subtask within one progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskProgress {
    pub progress_id: ProgressId,
    pub subtask_id: SubtaskId,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Timestamped free-text entry on a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub progress_id: ProgressId,
    pub author_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// SESSIONS & AUDIT
// =============================================================================

/// A server-side login session. Only the token hash is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    pub token_hash: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Kind of change recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ProgressUpdated,
    ProgressApproved,
    ProgressRevoked,
    ApprovalRequested,
    NoteAdded,
    SubtaskUpdated,
    LinkRequested,
    LinkApproved,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub actor_id: Option<UserId>,
    pub action: AuditAction,
    /// Record type name, e.g. `ProgressRecord`.
    pub entity: String,
    pub entity_id: u64,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Ranktrail system.
///
/// The pure algorithms never fail; everything touching records returns
/// `Result<T, TrackerError>`.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Caller-supplied data failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("{0} not found: {1}")]
    NotFound(&'static str, u64),

    /// No link row exists for the (leader, member) pair.
    #[error("Leader link not found: leader {leader}, member {member}")]
    LinkNotFound { leader: UserId, member: MemberId },

    /// No valid login session.
    #[error("Unauthorized")]
    Unauthorized,

    /// Logged in, but not allowed to perform this action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The change would violate a uniqueness rule.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> ProgressRecord {
        ProgressRecord {
            id: ProgressId(1),
            member_id: MemberId(2),
            requirement_id: RequirementId(3),
            started_at: None,
            eligible_at: None,
            completed_at: None,
            notes: None,
            approval: None,
            approval_comment: None,
            approval_request: None,
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn rank_positions_follow_declaration_order() {
        let positions: Vec<u32> = Rank::ALL.iter().map(|r| r.position()).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(Rank::Life.next(), Some(Rank::Eagle));
        assert_eq!(Rank::Eagle.next(), None);
    }

    #[test]
    fn rank_parses_loose_spellings() {
        assert_eq!("SECOND_CLASS".parse::<Rank>().unwrap(), Rank::SecondClass);
        assert_eq!("first class".parse::<Rank>().unwrap(), Rank::FirstClass);
        assert_eq!("Tenderfoot".parse::<Rank>().unwrap(), Rank::Tenderfoot);
        assert!("Wolf".parse::<Rank>().is_err());
    }

    #[test]
    fn role_accepts_legacy_scout_name() {
        assert_eq!("scout".parse::<Role>().unwrap(), Role::Member);
        assert_eq!("Leader".parse::<Role>().unwrap(), Role::Leader);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn initials_prefer_stored_value() {
        assert_eq!(infer_initials("Logan", "Leader", Some(" ll ")), "LL");
        assert_eq!(infer_initials("morgan", "bell", None), "MB");
        assert_eq!(infer_initials("Morgan", "Bell", Some("  ")), "MB");
        assert_eq!(infer_initials("", "", None), "");
    }

    #[test]
    fn completion_needs_approval_date_and_initials() {
        let now = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let mut progress = record();
        progress.completed_at = Some(now);
        assert!(!progress.is_complete());

        progress.approval = Some(Approval {
            leader_id: UserId(9),
            approved_at: now,
            initials: String::new(),
        });
        assert!(!progress.is_complete());

        progress.approval = Some(Approval {
            leader_id: UserId(9),
            approved_at: now,
            initials: "LL".to_string(),
        });
        assert!(progress.is_complete());

        progress.completed_at = None;
        assert!(!progress.is_complete());
    }

    #[test]
    fn clear_approval_drops_request_and_comment() {
        let now = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let mut progress = record();
        progress.approval = Some(Approval {
            leader_id: UserId(9),
            approved_at: now,
            initials: "LL".to_string(),
        });
        progress.approval_comment = Some("nice".to_string());
        progress.approval_request = Some(ApprovalRequest {
            leader_id: UserId(9),
            requested_by: UserId(4),
            requested_at: now,
        });

        progress.clear_approval();
        assert!(progress.approval.is_none());
        assert!(progress.approval_comment.is_none());
        assert!(progress.approval_request.is_none());
    }

    #[test]
    fn pending_only_for_requested_leader() {
        let now = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let mut progress = record();
        progress.approval_request = Some(ApprovalRequest {
            leader_id: UserId(9),
            requested_by: UserId(4),
            requested_at: now,
        });
        assert!(progress.is_pending_for(UserId(9)));
        assert!(!progress.is_pending_for(UserId(8)));
    }
}
