//! Integration tests for the Ranktrail HTTP API.
//!
//! Uses axum-test to drive the router without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::{TestRequest, TestResponse, TestServer};
use chrono::{TimeDelta, Utc};
use ranktrail::api::{AppState, SESSION_COOKIE, create_router, hash_password};
use ranktrail::config::ServerConfig;
use ranktrail_core::{
    MemberId, NewMember, NewRequirement, NewSubtask, NewUser, Rank, RequirementId, Role,
    SubtaskId, Tracker, UserId,
};
use serde_json::{Value, json};

const PASSWORD: &str = "trail-mix";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// A small troop: one member tracked by a scout account, a linked leader,
/// an unlinked leader, and an admin.
struct Fixture {
    server: TestServer,
    leader: UserId,
    other_leader: UserId,
    member: MemberId,
    campout: RequirementId,
    whipping: RequirementId,
    tent: SubtaskId,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        rate_limit: 0,
        secure_cookies: false,
        ..ServerConfig::default()
    }
}

fn user(email: &str, first: &str, last: &str, role: Role, hash: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        initials: None,
        role,
        password_hash: Some(hash.to_string()),
    }
}

fn fixture_with(config: ServerConfig) -> Fixture {
    let now = Utc::now();
    let hash = hash_password(PASSWORD).unwrap();
    let mut tracker = Tracker::new();

    let admin = tracker
        .create_user(user("admin@example.com", "Avery", "Admin", Role::Admin, &hash), now)
        .unwrap();
    let leader = tracker
        .create_user(
            NewUser {
                initials: Some("LL".to_string()),
                ..user("leader@example.com", "Logan", "Leader", Role::Leader, &hash)
            },
            now,
        )
        .unwrap();
    let other_leader = tracker
        .create_user(user("other@example.com", "Olive", "Outsider", Role::Leader, &hash), now)
        .unwrap();
    let scout = tracker
        .create_user(user("scout@example.com", "Alex", "Trailblazer", Role::Member, &hash), now)
        .unwrap();

    let member = tracker
        .create_member(
            NewMember {
                first_name: "Alex".to_string(),
                last_name: "Trailblazer".to_string(),
                email: None,
                phone: None,
                unit: Some("Troop 123".to_string()),
                council: None,
                current_rank: Rank::Scout,
                date_of_birth: None,
                user_id: Some(scout.id),
            },
            now,
        )
        .unwrap();

    let campout = tracker
        .add_requirement(NewRequirement {
            code: "TF-1a".to_string(),
            title: "Camp overnight with your patrol or troop.".to_string(),
            rank: Rank::Tenderfoot,
            summary: None,
            dependency_text: None,
            duration_days: None,
            duration_months: None,
            sort_order: 10,
        })
        .unwrap();
    let whipping = tracker
        .add_requirement(NewRequirement {
            code: "TF-2a".to_string(),
            title: "Show how to whip and fuse the ends of a rope.".to_string(),
            rank: Rank::Tenderfoot,
            summary: None,
            dependency_text: None,
            duration_days: Some(14),
            duration_months: None,
            sort_order: 20,
        })
        .unwrap();
    let tent = tracker
        .add_subtask(NewSubtask {
            requirement_id: campout.id,
            code: "TF-1a.1".to_string(),
            title: "Help pitch the tent.".to_string(),
            detail: None,
            sort_order: 10,
        })
        .unwrap();

    tracker.request_link(&admin, leader.id, member.id, now).unwrap();

    let router = create_router(AppState::new(tracker, config));
    Fixture {
        server: TestServer::new(router).unwrap(),
        leader: leader.id,
        other_leader: other_leader.id,
        member: member.id,
        campout: campout.id,
        whipping: whipping.id,
        tent: tent.id,
    }
}

fn fixture() -> Fixture {
    fixture_with(test_config())
}

/// Session token from a login response's `Set-Cookie` header.
fn session_token(response: &TestResponse) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login sets a cookie")
        .to_str()
        .unwrap()
        .to_string();
    let first = set_cookie.split(';').next().unwrap();
    let (name, value) = first.split_once('=').unwrap();
    assert_eq!(name, SESSION_COOKIE);
    value.to_string()
}

async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/login")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .await;
    response.assert_status_ok();
    session_token(&response)
}

fn with_session(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("cookie"),
        HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token)).unwrap(),
    )
}

async fn save_progress(f: &Fixture, token: &str, requirement: RequirementId, body: Value) -> Value {
    let mut payload = json!({
        "member_id": f.member,
        "requirement_id": requirement,
    });
    if let (Some(target), Some(extra)) = (payload.as_object_mut(), body.as_object()) {
        target.extend(extra.clone());
    }
    let response = with_session(f.server.post("/progress"), token)
        .json(&payload)
        .await;
    response.assert_status_ok();
    response.json::<Value>()
}

// =============================================================================
// HEALTH / LOGIN
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let f = fixture();
    let response = f.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_uniformly() {
    let f = fixture();

    let wrong_password = f
        .server
        .post("/login")
        .json(&json!({ "email": "scout@example.com", "password": "nope" }))
        .await;
    wrong_password.assert_status(StatusCode::UNAUTHORIZED);

    let unknown = f
        .server
        .post("/login")
        .json(&json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .await;
    unknown.assert_status(StatusCode::UNAUTHORIZED);

    let a: Value = wrong_password.json();
    let b: Value = unknown.json();
    assert_eq!(a["error"], "Invalid email or password");
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_login_sets_http_only_cookie_and_normalizes_email() {
    let f = fixture();
    let response = f
        .server
        .post("/login")
        .json(&json!({ "email": "  SCOUT@Example.com ", "password": PASSWORD }))
        .await;
    response.assert_status_ok();

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(!set_cookie.contains("Secure"));

    let body: Value = response.json();
    assert_eq!(body["role"], "MEMBER");
    assert_eq!(body["member_id"], json!(f.member));
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_me_requires_session() {
    let f = fixture();
    f.server.get("/me").await.assert_status(StatusCode::UNAUTHORIZED);

    let bogus = with_session(f.server.get("/me"), "not-a-real-token").await;
    bogus.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = bogus.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let f = fixture_with(ServerConfig {
        session_ttl: TimeDelta::seconds(-60),
        ..test_config()
    });
    let token = login(&f.server, "scout@example.com").await;

    for _ in 0..2 {
        with_session(f.server.get("/me"), &token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let f = fixture();
    let token = login(&f.server, "leader@example.com").await;
    let response = f
        .server
        .get("/me")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        )
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["initials"], "LL");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let f = fixture();
    let token = login(&f.server, "scout@example.com").await;
    with_session(f.server.get("/me"), &token)
        .await
        .assert_status_ok();

    let response = with_session(f.server.post("/logout"), &token).await;
    response.assert_status_ok();
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    with_session(f.server.get("/me"), &token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

// =============================================================================
// ELIGIBILITY / PROGRESS
// =============================================================================

#[tokio::test]
async fn test_eligibility_preview() {
    let f = fixture();
    let token = login(&f.server, "scout@example.com").await;

    let response = with_session(f.server.post("/eligibility/preview"), &token)
        .json(&json!({ "requirement_id": f.whipping, "started_at": "2024-02-10" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["eligible_at"], "2024-02-24T00:00:00Z");
    assert_eq!(body["days_remaining"], 0);

    let blank = with_session(f.server.post("/eligibility/preview"), &token)
        .json(&json!({ "requirement_id": f.whipping, "started_at": "  " }))
        .await;
    blank.assert_status_ok();
    let body: Value = blank.json();
    assert!(body["eligible_at"].is_null());

    let invalid = with_session(f.server.post("/eligibility/preview"), &token)
        .json(&json!({ "requirement_id": f.whipping, "started_at": "last tuesday" }))
        .await;
    invalid.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_member_saves_own_progress() {
    let f = fixture();
    let token = login(&f.server, "scout@example.com").await;

    let body = save_progress(
        &f,
        &token,
        f.whipping,
        json!({ "started_at": "2024-02-10", "notes": "Practised at home." }),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Progress saved.");
    assert_eq!(body["record"]["eligible_at"], "2024-02-24T00:00:00Z");
    assert_eq!(body["record"]["notes"], "Practised at home.");
    assert!(body["record"]["approval"].is_null());
}

#[tokio::test]
async fn test_unlinked_leader_cannot_touch_member() {
    let f = fixture();
    let token = login(&f.server, "other@example.com").await;

    let tracker = with_session(f.server.get("/tracker"), &token)
        .add_query_param("member_id", f.member)
        .await;
    tracker.assert_status(StatusCode::FORBIDDEN);

    let save = with_session(f.server.post("/progress"), &token)
        .json(&json!({ "member_id": f.member, "requirement_id": f.campout }))
        .await;
    save.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_approve_and_resave_clears_approval() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let leader = login(&f.server, "leader@example.com").await;

    let saved = save_progress(
        &f,
        &scout,
        f.campout,
        json!({ "started_at": "2024-01-15", "completed_at": "2024-02-20" }),
    )
    .await;
    let id = saved["record"]["id"].as_u64().unwrap();

    let forbidden = with_session(f.server.post(&format!("/progress/{}/approve", id)), &scout)
        .json(&json!({}))
        .await;
    forbidden.assert_status(StatusCode::FORBIDDEN);

    let approved = with_session(f.server.post(&format!("/progress/{}/approve", id)), &leader)
        .json(&json!({ "comment": "Great campout." }))
        .await;
    approved.assert_status_ok();
    let body: Value = approved.json();
    assert_eq!(body["message"], "Requirement approved.");
    assert_eq!(body["record"]["approval"]["initials"], "LL");
    assert_eq!(body["record"]["approval"]["leader_id"], json!(f.leader));
    assert_eq!(body["record"]["approval_comment"], "Great campout.");

    let resaved = save_progress(
        &f,
        &scout,
        f.campout,
        json!({ "started_at": "2024-01-16", "completed_at": "2024-02-20" }),
    )
    .await;
    assert!(resaved["record"]["approval"].is_null());
    assert!(resaved["record"]["approval_request"].is_null());
}

#[tokio::test]
async fn test_revoke_records_reason() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let leader = login(&f.server, "leader@example.com").await;

    let saved = save_progress(&f, &scout, f.campout, json!({ "completed_at": "2024-02-20" })).await;
    let id = saved["record"]["id"].as_u64().unwrap();

    with_session(f.server.post(&format!("/progress/{}/approve", id)), &leader)
        .json(&json!({}))
        .await
        .assert_status_ok();

    let revoked = with_session(f.server.post(&format!("/progress/{}/revoke", id)), &leader)
        .json(&json!({ "reason": "Signed the wrong card." }))
        .await;
    revoked.assert_status_ok();
    let body: Value = revoked.json();
    assert_eq!(body["message"], "Approval revoked.");
    assert!(body["record"]["approval"].is_null());
    assert_eq!(body["record"]["approval_comment"], "Signed the wrong card.");
}

#[tokio::test]
async fn test_approval_request_flow() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let leader = login(&f.server, "leader@example.com").await;

    let saved = save_progress(&f, &scout, f.whipping, json!({ "started_at": "2024-02-10" })).await;
    let id = saved["record"]["id"].as_u64().unwrap();

    let unlinked = with_session(
        f.server.post(&format!("/progress/{}/request-approval", id)),
        &scout,
    )
    .json(&json!({ "leader_id": f.other_leader }))
    .await;
    unlinked.assert_status(StatusCode::FORBIDDEN);
    let body: Value = unlinked.json();
    assert_eq!(
        body["error"],
        "That leader is not currently assigned to this member."
    );

    let requested = with_session(
        f.server.post(&format!("/progress/{}/request-approval", id)),
        &scout,
    )
    .json(&json!({ "leader_id": f.leader }))
    .await;
    requested.assert_status_ok();
    let body: Value = requested.json();
    assert_eq!(body["message"], "Approval requested.");

    let dashboard = with_session(f.server.get("/leader"), &leader).await;
    dashboard.assert_status_ok();
    let body: Value = dashboard.json();
    assert_eq!(body["assigned_members"].as_array().unwrap().len(), 1);
    let pending = body["pending"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["member_name"], "Alex Trailblazer");
    assert_eq!(pending[0]["requirement"]["code"], "TF-2a");

    with_session(f.server.post(&format!("/progress/{}/approve", id)), &leader)
        .json(&json!({}))
        .await
        .assert_status_ok();
    let body: Value = with_session(f.server.get("/leader"), &leader).await.json();
    assert!(body["pending"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_after_approval_returns_to_leader_queue() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let leader = login(&f.server, "leader@example.com").await;

    let saved = save_progress(
        &f,
        &scout,
        f.whipping,
        json!({ "started_at": "2024-02-10", "completed_at": "2024-02-24" }),
    )
    .await;
    let id = saved["record"]["id"].as_u64().unwrap();

    with_session(f.server.post(&format!("/progress/{}/approve", id)), &leader)
        .json(&json!({ "comment": "Nice work" }))
        .await
        .assert_status_ok();

    let requested = with_session(
        f.server.post(&format!("/progress/{}/request-approval", id)),
        &scout,
    )
    .json(&json!({ "leader_id": f.leader }))
    .await;
    requested.assert_status_ok();
    let body: Value = requested.json();
    assert!(body["record"]["approval"].is_null());
    assert!(body["record"]["approval_comment"].is_null());
    assert_eq!(body["record"]["approval_request"]["leader_id"], json!(f.leader));

    let body: Value = with_session(f.server.get("/leader"), &leader).await.json();
    let pending = body["pending"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["progress"]["id"], json!(id));
}

#[tokio::test]
async fn test_leader_dashboard_is_for_leaders() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    with_session(f.server.get("/leader"), &scout)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

// =============================================================================
// NOTES / SUBTASKS / DASHBOARD
// =============================================================================

#[tokio::test]
async fn test_notes_and_subtasks_show_on_tracker() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;

    let saved = save_progress(&f, &scout, f.campout, json!({ "started_at": "2024-01-15" })).await;
    let id = saved["record"]["id"].as_u64().unwrap();

    let empty = with_session(f.server.post(&format!("/progress/{}/notes", id)), &scout)
        .json(&json!({ "body": "   " }))
        .await;
    empty.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = empty.json();
    assert_eq!(body["error"], "Please enter a note before saving.");

    let note = with_session(f.server.post(&format!("/progress/{}/notes", id)), &scout)
        .json(&json!({ "body": "Packed my sleeping bag." }))
        .await;
    note.assert_status_ok();
    let body: Value = note.json();
    assert_eq!(body["message"], "Note added.");

    let toggled = with_session(f.server.post(&format!("/progress/{}/subtasks", id)), &scout)
        .json(&json!({ "subtask_id": f.tent, "completed": true }))
        .await;
    toggled.assert_status_ok();
    let body: Value = toggled.json();
    assert_eq!(body["message"], "Subtask updated.");
    assert!(!body["record"]["completed_at"].is_null());

    // Member accounts default to their own record.
    let tracker = with_session(f.server.get("/tracker"), &scout).await;
    tracker.assert_status_ok();
    let body: Value = tracker.json();
    assert_eq!(body["member"]["id"], json!(f.member));
    assert_eq!(body["notes_feed"].as_array().unwrap().len(), 1);
    assert_eq!(body["notes_feed"][0]["note"]["body"], "Packed my sleeping bag.");
    assert_eq!(body["leaders"][0]["initials"], "LL");

    let panels = body["rank_panels"].as_array().unwrap();
    assert_eq!(panels.len(), 1);
    assert_eq!(panels[0]["title"], "Tenderfoot");
    let campout = &panels[0]["requirements"][0];
    assert_eq!(campout["requirement"]["code"], "TF-1a");
    assert!(!campout["subtasks"][0]["completed_at"].is_null());

    let steps = body["next_steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
}

#[tokio::test]
async fn test_subtask_from_other_requirement_is_rejected() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let saved = save_progress(&f, &scout, f.whipping, json!({})).await;
    let id = saved["record"]["id"].as_u64().unwrap();

    with_session(f.server.post(&format!("/progress/{}/subtasks", id)), &scout)
        .json(&json!({ "subtask_id": f.tent, "completed": true }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_progress_is_not_found() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    with_session(f.server.post("/progress/9999/notes"), &scout)
        .json(&json!({ "body": "hello" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// =============================================================================
// LINKS / AUDIT
// =============================================================================

#[tokio::test]
async fn test_leader_link_request_needs_admin_approval() {
    let f = fixture();
    let outsider = login(&f.server, "other@example.com").await;
    let admin = login(&f.server, "admin@example.com").await;

    let requested = with_session(f.server.post("/links"), &outsider)
        .json(&json!({ "member_id": f.member }))
        .await;
    requested.assert_status_ok();
    let body: Value = requested.json();
    assert_eq!(body["record"]["status"], "PENDING");

    // Still no access while pending.
    with_session(f.server.get("/tracker"), &outsider)
        .add_query_param("member_id", f.member)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    with_session(f.server.post("/links/approve"), &outsider)
        .json(&json!({ "leader_id": f.other_leader, "member_id": f.member }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let approved = with_session(f.server.post("/links/approve"), &admin)
        .json(&json!({ "leader_id": f.other_leader, "member_id": f.member }))
        .await;
    approved.assert_status_ok();
    let body: Value = approved.json();
    assert_eq!(body["record"]["status"], "APPROVED");

    with_session(f.server.get("/tracker"), &outsider)
        .add_query_param("member_id", f.member)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_approving_unknown_link_is_not_found() {
    let f = fixture();
    let admin = login(&f.server, "admin@example.com").await;

    let response = with_session(f.server.post("/links/approve"), &admin)
        .json(&json!({ "leader_id": f.other_leader, "member_id": f.member }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(
        body["error"],
        format!(
            "Leader link not found: leader {}, member {}",
            f.other_leader, f.member
        )
    );
}

#[tokio::test]
async fn test_audit_log_is_admin_only() {
    let f = fixture();
    let scout = login(&f.server, "scout@example.com").await;
    let admin = login(&f.server, "admin@example.com").await;

    save_progress(&f, &scout, f.campout, json!({ "started_at": "2024-01-15" })).await;

    with_session(f.server.get("/audit"), &scout)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = with_session(f.server.get("/audit"), &admin).await;
    response.assert_status_ok();
    let entries: Value = response.json();
    let actions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["LINK_APPROVED", "PROGRESS_UPDATED"]);
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let f = fixture_with(ServerConfig {
        rate_limit: 1,
        ..test_config()
    });
    f.server.get("/health").await.assert_status_ok();
    let limited = f.server.get("/health").await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = limited.json();
    assert_eq!(body["success"], false);
}
