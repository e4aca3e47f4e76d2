//! # HTTP Handlers
//!
//! Request handlers for the Ranktrail API. Each handler takes the tracker
//! lock for one operation: reads share it, mutations hold it exclusively.

use super::AppState;
use super::auth::{
    CurrentUser, clear_session_cookie, generate_token, hash_token, require_role,
    session_cookie, token_from_headers, verify_login,
};
use super::types::{
    ActionResponse, ApproveRequest, EligibilityPreviewRequest, EligibilityPreviewResponse,
    HealthResponse, LinkApproveRequest, LinkRequest, LoginRequest, NoteRequest, RecordResponse,
    RequestApprovalRequest, RevokeRequest, SaveProgressRequest, SubtaskRequest, TrackerQuery,
    UserResponse, parse_date,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use ranktrail_core::{
    ProgressId, Role, TrackerError, days_remaining, leader_dashboard, member_dashboard,
    normalize_email,
};

const INVALID_LOGIN: &str = "Invalid email or password";

// =============================================================================
// ERRORS
// =============================================================================

/// A [`TrackerError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TrackerError);

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        Self(e)
    }
}

/// HTTP status for each error kind.
pub fn status_for(error: &TrackerError) -> StatusCode {
    match error {
        TrackerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TrackerError::NotFound(..) | TrackerError::LinkNotFound { .. } => StatusCode::NOT_FOUND,
        TrackerError::Unauthorized => StatusCode::UNAUTHORIZED,
        TrackerError::Forbidden(_) => StatusCode::FORBIDDEN,
        TrackerError::Conflict(_) => StatusCode::CONFLICT,
        TrackerError::SerializationError(_) | TrackerError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = match self.0 {
            TrackerError::InvalidInput(m)
            | TrackerError::Forbidden(m)
            | TrackerError::Conflict(m) => m,
            TrackerError::Unauthorized => "Please sign in to continue.".to_string(),
            e @ (TrackerError::NotFound(..) | TrackerError::LinkNotFound { .. }) => e.to_string(),
            e @ (TrackerError::SerializationError(_) | TrackerError::IoError(_)) => {
                tracing::error!(error = %e, "Request failed");
                "Something went wrong. Please try again.".to_string()
            }
        };
        (status, Json(ActionResponse::error(message))).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;

// =============================================================================
// HEALTH
// =============================================================================

/// Liveness check.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// LOGIN / LOGOUT
// =============================================================================

/// Verify email and password, open a session and set the cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult {
    let email = normalize_email(&req.email);
    let user = state.tracker.read().await.find_user_by_email(&email)?;

    let account = user.and_then(|u| u.password_hash.clone().map(|h| (u, h)));
    let stored = account.as_ref().map(|(_, hash)| hash.clone());

    // argon2 verification blocks for tens of milliseconds.
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_login(&password, stored.as_deref()))
        .await
        .map_err(|e| TrackerError::IoError(format!("Password check failed: {}", e)))?;
    let Some((user, _)) = account else {
        tracing::warn!(event = "auth_failure", reason = "unknown_account", "Login failed");
        return Ok(invalid_login());
    };
    if !valid {
        tracing::warn!(
            event = "auth_failure",
            reason = "bad_password",
            user_id = %user.id,
            "Login failed"
        );
        return Ok(invalid_login());
    }

    let token = generate_token();
    let member_id = {
        let mut tracker = state.tracker.write().await;
        tracker.open_session(user.id, hash_token(&token), state.config.session_ttl, Utc::now())?;
        tracker.member_for_user(user.id)?.map(|m| m.id)
    };
    tracing::info!(event = "login", user_id = %user.id, role = %user.role, "User signed in");

    let cookie = session_cookie(&token, state.config.session_ttl, state.config.secure_cookies);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(UserResponse::new(&user, member_id)),
    )
        .into_response())
}

fn invalid_login() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ActionResponse::error(INVALID_LOGIN)),
    )
        .into_response()
}

/// Drop the session, if any, and expire the cookie.
pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if let Some(token) = token_from_headers(&headers) {
        let closed = state.tracker.write().await.close_session(&hash_token(&token))?;
        if closed {
            tracing::info!(event = "logout", "Session closed");
        }
    }
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(state.config.secure_cookies))],
        Json(ActionResponse::success("Signed out.")),
    )
        .into_response())
}

/// The signed-in user.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult {
    let member_id = state.tracker.read().await.member_for_user(user.id)?.map(|m| m.id);
    Ok(Json(UserResponse::new(&user, member_id)).into_response())
}

// =============================================================================
// DASHBOARDS
// =============================================================================

/// Member tracker page: rank panels, next steps, notes feed and leaders.
///
/// Member accounts default to their own record.
pub async fn tracker_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<TrackerQuery>,
) -> ApiResult {
    let tracker = state.tracker.read().await;
    let member_id = match query.member_id {
        Some(id) => id,
        None => tracker
            .member_for_user(user.id)?
            .map(|m| m.id)
            .ok_or_else(|| TrackerError::InvalidInput("member_id is required".to_string()))?,
    };
    tracker.ensure_member_access(&user, member_id)?;
    let dashboard = member_dashboard(&tracker, member_id, Utc::now())?;
    Ok(Json(dashboard).into_response())
}

/// Leader page: linked members and approvals addressed to this leader.
pub async fn leader_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult {
    require_role(&user, &[Role::Leader])?;
    let dashboard = leader_dashboard(&*state.tracker.read().await, &user)?;
    Ok(Json(dashboard).into_response())
}

/// Eligibility date for a requirement and dates, without saving anything.
pub async fn eligibility_preview_handler(
    State(state): State<AppState>,
    Json(req): Json<EligibilityPreviewRequest>,
) -> ApiResult {
    let started_at = parse_date("started_at", req.started_at.as_deref())?;
    let manual = parse_date("eligible_at", req.eligible_at.as_deref())?;
    let eligible_at = state
        .tracker
        .read()
        .await
        .preview_eligibility(req.requirement_id, started_at, manual)?;
    let now = Utc::now();
    Ok(Json(EligibilityPreviewResponse {
        eligible_at,
        days_remaining: eligible_at.map(|at| days_remaining(at, now)),
    })
    .into_response())
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Create or replace a progress record. Clears any approval.
pub async fn save_progress_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SaveProgressRequest>,
) -> ApiResult {
    let update = req.into_update()?;
    let record = state
        .tracker
        .write()
        .await
        .save_progress(&user, update, Utc::now())?;
    tracing::info!(
        event = "progress_saved",
        progress_id = %record.id,
        member_id = %record.member_id,
        requirement_id = %record.requirement_id,
        actor = %user.id,
        "Progress saved"
    );
    Ok((StatusCode::OK, Json(RecordResponse::new("Progress saved.", record))).into_response())
}

pub async fn approve_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult {
    let record = state
        .tracker
        .write()
        .await
        .approve_progress(&user, ProgressId(id), req.comment, Utc::now())?;
    tracing::info!(
        event = "progress_approved",
        progress_id = %record.id,
        member_id = %record.member_id,
        actor = %user.id,
        "Requirement approved"
    );
    Ok(Json(RecordResponse::new("Requirement approved.", record)).into_response())
}

pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(req): Json<RevokeRequest>,
) -> ApiResult {
    let record = state
        .tracker
        .write()
        .await
        .revoke_progress(&user, ProgressId(id), req.reason, Utc::now())?;
    tracing::info!(
        event = "progress_revoked",
        progress_id = %record.id,
        member_id = %record.member_id,
        actor = %user.id,
        "Approval revoked"
    );
    Ok(Json(RecordResponse::new("Approval revoked.", record)).into_response())
}

/// Ask a linked leader to review a record.
pub async fn request_approval_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(req): Json<RequestApprovalRequest>,
) -> ApiResult {
    let record = state.tracker.write().await.request_approval(
        &user,
        ProgressId(id),
        req.leader_id,
        Utc::now(),
    )?;
    tracing::info!(
        event = "approval_requested",
        progress_id = %record.id,
        leader_id = %req.leader_id,
        actor = %user.id,
        "Approval requested"
    );
    Ok(Json(RecordResponse::new("Approval requested.", record)).into_response())
}

pub async fn add_note_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(req): Json<NoteRequest>,
) -> ApiResult {
    let note = state
        .tracker
        .write()
        .await
        .add_note(&user, ProgressId(id), &req.body, Utc::now())?;
    tracing::info!(
        event = "note_added",
        note_id = %note.id,
        progress_id = %note.progress_id,
        actor = %user.id,
        "Note added"
    );
    Ok(Json(RecordResponse::new("Note added.", note)).into_response())
}

pub async fn subtask_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<u64>,
    Json(req): Json<SubtaskRequest>,
) -> ApiResult {
    let entry = state.tracker.write().await.set_subtask_completed(
        &user,
        ProgressId(id),
        req.subtask_id,
        req.completed,
        Utc::now(),
    )?;
    tracing::info!(
        event = "subtask_updated",
        progress_id = %entry.progress_id,
        subtask_id = %entry.subtask_id,
        completed = req.completed,
        actor = %user.id,
        "Subtask updated"
    );
    Ok(Json(RecordResponse::new("Subtask updated.", entry)).into_response())
}

// =============================================================================
// LEADER LINKS
// =============================================================================

/// Link a leader to a member. Pending for leaders, immediate for admins.
pub async fn create_link_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<LinkRequest>,
) -> ApiResult {
    let leader_id = req.leader_id.unwrap_or(user.id);
    let link = state
        .tracker
        .write()
        .await
        .request_link(&user, leader_id, req.member_id, Utc::now())?;
    let message = if link.is_approved() {
        "Leader linked."
    } else {
        "Link requested."
    };
    tracing::info!(
        event = "link_saved",
        leader_id = %link.leader_id,
        member_id = %link.member_id,
        status = ?link.status,
        actor = %user.id,
        "{}",
        message
    );
    Ok(Json(RecordResponse::new(message, link)).into_response())
}

pub async fn approve_link_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<LinkApproveRequest>,
) -> ApiResult {
    let link = state
        .tracker
        .write()
        .await
        .approve_link(&user, req.leader_id, req.member_id, Utc::now())?;
    tracing::info!(
        event = "link_approved",
        leader_id = %link.leader_id,
        member_id = %link.member_id,
        actor = %user.id,
        "Leader link approved"
    );
    Ok(Json(RecordResponse::new("Leader link approved.", link)).into_response())
}

// =============================================================================
// AUDIT
// =============================================================================

/// Every audit entry, oldest first. Admins only.
pub async fn audit_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult {
    let entries = state.tracker.read().await.audit_log(&user)?;
    Ok(Json(entries).into_response())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TrackerError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TrackerError::NotFound("Member", 1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&TrackerError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&TrackerError::Forbidden("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&TrackerError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&TrackerError::IoError("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
