//! # API Request/Response Types
//!
//! JSON bodies for the HTTP API, and the parsing that turns loose form-style
//! input (blank strings, bare dates) into core types.

use chrono::{DateTime, NaiveDate, Utc};
use ranktrail_core::{
    MemberId, ProgressUpdate, RequirementId, Role, SubtaskId, TrackerError, User, UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ACTION RESULTS
// =============================================================================

/// Outcome of a mutation, and the body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(message.into()),
        }
    }
}

/// A successful mutation together with the record it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse<T> {
    pub success: bool,
    pub message: String,
    pub record: T,
}

impl<T> RecordResponse<T> {
    pub fn new(message: impl Into<String>, record: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            record,
        }
    }
}

// =============================================================================
// LOGIN / CURRENT USER
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The signed-in user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub initials: String,
    pub role: Role,
    /// The member record this account tracks, for member accounts.
    pub member_id: Option<MemberId>,
}

impl UserResponse {
    pub fn new(user: &User, member_id: Option<MemberId>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            initials: user.signing_initials(),
            role: user.role,
            member_id,
        }
    }
}

// =============================================================================
// TRACKER / ELIGIBILITY
// =============================================================================

/// Query string of `GET /tracker`. Member accounts may omit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerQuery {
    pub member_id: Option<MemberId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityPreviewRequest {
    pub requirement_id: RequirementId,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub eligible_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityPreviewResponse {
    pub eligible_at: Option<DateTime<Utc>>,
    /// Whole days from now, zero once the date has passed.
    pub days_remaining: Option<i64>,
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Body of `POST /progress`. Dates are `YYYY-MM-DD` or RFC 3339; blank means unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProgressRequest {
    pub member_id: MemberId,
    pub requirement_id: RequirementId,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    /// Manual eligibility date, used only when no start date is given.
    #[serde(default)]
    pub eligible_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SaveProgressRequest {
    /// Parse the dates and build a core update.
    pub fn into_update(self) -> Result<ProgressUpdate, TrackerError> {
        Ok(ProgressUpdate {
            member_id: self.member_id,
            requirement_id: self.requirement_id,
            started_at: parse_date("started_at", self.started_at.as_deref())?,
            completed_at: parse_date("completed_at", self.completed_at.as_deref())?,
            eligible_override: parse_date("eligible_at", self.eligible_at.as_deref())?,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestApprovalRequest {
    pub leader_id: UserId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskRequest {
    pub subtask_id: SubtaskId,
    pub completed: bool,
}

// =============================================================================
// LEADER LINKS
// =============================================================================

/// Body of `POST /links`. Leaders omit `leader_id` to link themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    #[serde(default)]
    pub leader_id: Option<UserId>,
    pub member_id: MemberId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkApproveRequest {
    pub leader_id: UserId,
    pub member_id: MemberId,
}

// =============================================================================
// DATE PARSING
// =============================================================================

/// Parse an optional date field.
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
/// Missing and blank values are `None`.
pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, TrackerError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| {
            TrackerError::InvalidInput(format!(
                "{} must be a date (YYYY-MM-DD), got {:?}",
                field, raw
            ))
        })
}
