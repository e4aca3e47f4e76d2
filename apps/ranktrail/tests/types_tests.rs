//! Unit tests for API types serialization/deserialization and input parsing.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use ranktrail::api::{
    ActionResponse, HealthResponse, LinkRequest, NoteRequest, RecordResponse, SaveProgressRequest,
    UserResponse, parse_date,
};
use ranktrail_core::{MemberId, Note, NoteId, ProgressId, RequirementId, Role, TrackerError, User, UserId};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// ACTION RESPONSE TESTS
// =============================================================================

#[test]
fn test_action_response_success_omits_error() {
    let json = serde_json::to_string(&ActionResponse::success("Progress saved.")).unwrap();
    assert_eq!(json, r#"{"success":true,"message":"Progress saved."}"#);
}

#[test]
fn test_action_response_error_omits_message() {
    let json = serde_json::to_string(&ActionResponse::error("Invalid email or password")).unwrap();
    assert_eq!(json, r#"{"success":false,"error":"Invalid email or password"}"#);

    let back: ActionResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ActionResponse::error("Invalid email or password"));
}

#[test]
fn test_record_response_wraps_record() {
    let note = Note {
        id: NoteId(3),
        progress_id: ProgressId(2),
        author_id: Some(UserId(1)),
        body: "Packed my sleeping bag.".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    };
    let json = serde_json::to_value(RecordResponse::new("Note added.", note.clone())).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Note added.");
    assert_eq!(json["record"]["created_at"], "2024-03-01T12:00:00Z");

    let back: RecordResponse<Note> = serde_json::from_value(json).unwrap();
    assert_eq!(back.record, note);
}

#[test]
fn test_user_response_hides_password_hash() {
    let user = User {
        id: UserId(7),
        email: "leader@example.com".to_string(),
        first_name: "Logan".to_string(),
        last_name: "Leader".to_string(),
        initials: None,
        role: Role::Leader,
        password_hash: Some("$argon2id$secret".to_string()),
        created_at: Utc::now(),
    };
    let json = serde_json::to_string(&UserResponse::new(&user, None)).unwrap();
    assert!(!json.contains("argon2"));
    assert!(json.contains(r#""initials":"LL""#));
    assert!(json.contains(r#""role":"LEADER""#));
}

// =============================================================================
// REQUEST PARSING TESTS
// =============================================================================

#[test]
fn test_parse_date_formats() {
    let midnight = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
    assert_eq!(parse_date("d", Some("2024-02-10")).unwrap(), Some(midnight));
    assert_eq!(
        parse_date("d", Some("2024-02-10T00:00:00Z")).unwrap(),
        Some(midnight)
    );
    assert_eq!(
        parse_date("d", Some("2024-02-10T02:00:00+02:00")).unwrap(),
        Some(midnight)
    );
}

#[test]
fn test_parse_date_blank_is_absent() {
    assert_eq!(parse_date("d", None).unwrap(), None);
    assert_eq!(parse_date("d", Some("")).unwrap(), None);
    assert_eq!(parse_date("d", Some("   ")).unwrap(), None);
}

#[test]
fn test_parse_date_rejects_garbage() {
    let err = parse_date("started_at", Some("2024-13-40")).unwrap_err();
    match err {
        TrackerError::InvalidInput(msg) => assert!(msg.contains("started_at")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_save_progress_request_into_update() {
    let json = r#"{
        "member_id": 4,
        "requirement_id": 9,
        "started_at": "2024-02-10",
        "completed_at": "",
        "eligible_at": "2024-03-01",
        "notes": "Done at camp."
    }"#;
    let request: SaveProgressRequest = serde_json::from_str(json).unwrap();
    let update = request.into_update().unwrap();

    assert_eq!(update.member_id, MemberId(4));
    assert_eq!(update.requirement_id, RequirementId(9));
    assert!(update.started_at.is_some());
    assert!(update.completed_at.is_none());
    assert_eq!(
        update.eligible_override,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(update.notes.as_deref(), Some("Done at camp."));
}

#[test]
fn test_optional_fields_default() {
    let request: SaveProgressRequest =
        serde_json::from_str(r#"{"member_id":1,"requirement_id":2}"#).unwrap();
    assert!(request.started_at.is_none());
    assert!(request.notes.is_none());

    let note: NoteRequest = serde_json::from_str("{}").unwrap();
    assert!(note.body.is_empty());

    let link: LinkRequest = serde_json::from_str(r#"{"member_id":5}"#).unwrap();
    assert!(link.leader_id.is_none());
    assert_eq!(link.member_id, MemberId(5));
}
