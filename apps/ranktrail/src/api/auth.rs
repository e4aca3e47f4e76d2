//! # Authentication Module
//!
//! Password hashing and cookie sessions for the Ranktrail HTTP API.
//!
//! Passwords are stored as argon2 PHC strings. A login mints 32 random bytes,
//! hands them to the client base64url-encoded in the `ranktrail_session`
//! cookie, and stores only their SHA-256 hash. Clients that cannot keep
//! cookies may send the same token as `Authorization: Bearer <token>`.

use super::AppState;
use super::handlers::ApiError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{TimeDelta, Utc};
use ranktrail_core::{Role, SessionLookup, TrackerError, User};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "ranktrail_session";

/// Random bytes in a session token.
const TOKEN_BYTES: usize = 32;

// =============================================================================
// PASSWORDS
// =============================================================================

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, TrackerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TrackerError::IoError(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Hash of a random password nobody knows, built on first use.
fn decoy_hash() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| hash_password(&generate_token()).unwrap_or_default())
}

/// Check a login attempt. Accounts without a stored hash are verified
/// against a decoy so every attempt pays one argon2 verification.
pub fn verify_login(password: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(stored) => verify_password(password, stored),
        None => {
            let _ = verify_password(password, decoy_hash());
            false
        }
    }
}

// =============================================================================
// SESSION TOKENS
// =============================================================================

/// Fresh random session token, base64url without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The form a token is stored in.
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// `Set-Cookie` value carrying a new session token.
pub fn session_cookie(token: &str, ttl: TimeDelta, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds().max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that expires the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", TimeDelta::zero(), secure)
}

/// Session token from the cookie, falling back to a bearer header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// The user behind the request's session, inserted by [`session_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve the session token and attach the [`CurrentUser`].
///
/// Requests without a live session get 401. Lookups share the read lock;
/// only an expired session takes the write lock, to delete it.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = token_from_headers(request.headers()) else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_session",
            path = %request.uri().path(),
            "No session token on request"
        );
        return ApiError(TrackerError::Unauthorized).into_response();
    };

    let token_hash = hash_token(&token);
    let now = Utc::now();
    let lookup = state.tracker.read().await.lookup_session(&token_hash, now);
    let resolved = match lookup {
        Ok(SessionLookup::Active(user)) => Ok(Some(user)),
        Ok(SessionLookup::Expired) => state
            .tracker
            .write()
            .await
            .close_session(&token_hash)
            .map(|_| None),
        Ok(SessionLookup::Unknown) => Ok(None),
        Err(e) => Err(e),
    };

    match resolved {
        Ok(Some(user)) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "unknown_or_expired_session",
                path = %request.uri().path(),
                "Session token rejected"
            );
            ApiError(TrackerError::Unauthorized).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Fail with `Forbidden` unless the user holds one of `roles`.
pub fn require_role(user: &User, roles: &[Role]) -> Result<(), TrackerError> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(TrackerError::Forbidden(format!(
            "This page is not available to {} accounts.",
            user.role.as_str().to_ascii_lowercase()
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse", &hash));
        assert!(!verify_password("wrong-horse", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn test_verify_login_without_account_never_matches() {
        let hash = hash_password("trail-mix").unwrap();
        assert!(verify_login("trail-mix", Some(&hash)));
        assert!(!verify_login("wrong", Some(&hash)));
        assert!(!verify_login("trail-mix", None));
        assert!(!verify_login("", None));
        assert!(decoy_hash().starts_with("$argon2"));
    }

    #[test]
    fn test_tokens_are_unique_and_hash_stably() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", TimeDelta::hours(1), true);
        assert!(cookie.starts_with("ranktrail_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));

        let cleared = clear_session_cookie(false);
        assert!(cleared.contains("Max-Age=0"));
        assert!(!cleared.contains("Secure"));
    }

    #[test]
    fn test_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; ranktrail_session=tok123; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok456"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("tok456"));

        let empty = HeaderMap::new();
        assert!(token_from_headers(&empty).is_none());
    }
}
