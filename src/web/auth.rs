// Auth middleware: stateless HMAC-SHA256 session token validation.
//
// Session token format: {user_id}.{timestamp_secs}.{nonce_hex}.{hmac_hex}
//
// The HMAC covers "{user_id}.{timestamp_secs}.{nonce_hex}" signed with
// MURMUR_SESSION_SECRET. Tokens are valid for SESSION_TTL_SECS (24 hours).
// Issuing tokens belongs to the login service in front of murmur; the
// `murmur token` command mints them for development.
//
// Auth check (this middleware):
//   murmur_session cookie or Authorization: Bearer → parse → verify HMAC
//   → verify age → insert AuthUser(user_id) → allow

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::{AppState, AuthUser};

type HmacSha256 = Hmac<Sha256>;

/// Session cookie name.
pub const COOKIE_NAME: &str = "murmur_session";

/// Session lifetime: 24 hours.
pub const SESSION_TTL_SECS: u64 = 86_400;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build a new session token for `user_id` signed with `secret`.
pub fn create_token(secret: &str, user_id: i64) -> String {
    create_token_at(secret, user_id, now_secs())
}

fn create_token_at(secret: &str, user_id: i64, timestamp: u64) -> String {
    let mut nonce_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = hex::encode(nonce_bytes);

    let payload = format!("{user_id}.{timestamp}.{nonce}");
    let sig = hmac_sign(secret, &payload).unwrap_or_default();

    format!("{payload}.{sig}")
}

/// Verify a session token. Returns the user id if the HMAC is valid and
/// the token is not older than `SESSION_TTL_SECS`.
pub fn verify_token(secret: &str, token: &str) -> Option<i64> {
    // Format: {user_id}.{timestamp}.{nonce}.{hmac}
    let parts: Vec<&str> = token.splitn(4, '.').collect();
    let [user_str, timestamp_str, nonce, provided_sig] = parts.as_slice() else {
        return None;
    };

    // Verify HMAC
    let payload = format!("{user_str}.{timestamp_str}.{nonce}");
    let expected_sig = hmac_sign(secret, &payload)?;
    if !constant_time_eq(provided_sig, &expected_sig) {
        return None;
    }

    // Verify age
    let timestamp = timestamp_str.parse::<u64>().ok()?;
    if now_secs().saturating_sub(timestamp) >= SESSION_TTL_SECS {
        return None;
    }

    user_str.parse::<i64>().ok()
}

/// Axum middleware: reject requests without a valid session token with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = session_user(&request, &state.config.session_secret) else {
        return super::api_error(
            axum::http::StatusCode::UNAUTHORIZED,
            "Authentication required",
        );
    };

    request.extensions_mut().insert(AuthUser(user_id));
    next.run(request).await
}

// --- Private helpers ---

fn hmac_sign(secret: &str, payload: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Extract and validate the session token from the request. The bearer
/// header wins over the cookie.
fn session_user(request: &Request, secret: &str) -> Option<i64> {
    let headers = request.headers();

    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let token = value.to_str().ok()?.strip_prefix("Bearer ")?;
        return verify_token(secret, token.trim());
    }

    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == COOKIE_NAME)
        .and_then(|(_, value)| verify_token(secret, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_32_bytes_long_enough!";

    #[test]
    fn test_token_roundtrip() {
        let token = create_token(SECRET, 42);
        assert_eq!(verify_token(SECRET, &token), Some(42));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token("correct_secret", 1);
        assert_eq!(verify_token("wrong_secret", &token), None);
    }

    #[test]
    fn test_user_id_cannot_be_swapped() {
        let token = create_token(SECRET, 1);
        let forged = token.replacen('1', "2", 1);
        assert_eq!(verify_token(SECRET, &forged), None);
    }

    #[test]
    fn test_expired_token_rejected() {
        let old = now_secs() - SESSION_TTL_SECS - 1;
        let token = create_token_at(SECRET, 7, old);
        assert_eq!(verify_token(SECRET, &token), None);
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert_eq!(verify_token(SECRET, ""), None);
        assert_eq!(verify_token(SECRET, "onlytwoparts.here"), None);
        assert_eq!(verify_token(SECRET, "a.b.c.d"), None);
    }

    #[test]
    fn test_bearer_and_cookie_extraction() {
        let token = create_token(SECRET, 5);

        let request = axum::http::Request::builder()
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(session_user(&request, SECRET), Some(5));

        let request = axum::http::Request::builder()
            .header(header::COOKIE, format!("theme=dark; {COOKIE_NAME}={token}"))
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(session_user(&request, SECRET), Some(5));

        let request = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(session_user(&request, SECRET), None);
    }
}
