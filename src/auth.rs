//! Credentials: password hashing, opaque bearer tokens and reset tokens.
//!
//! Only SHA-256 digests of tokens are stored. Passwords use the
//! `sha256$<iterations>$<salt>$<hex>` format.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::ipc::error::ApiError;
use crate::model::{self, user, User};

const HASH_SCHEME: &str = "sha256";
const HASH_ITERATIONS: u32 = 10_000;
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = stretch(password, &salt, HASH_ITERATIONS);
    format!("{HASH_SCHEME}${HASH_ITERATIONS}${salt}${digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    constant_time_eq(stretch(password, salt, iterations).as_bytes(), expected.as_bytes())
}

fn stretch(password: &str, salt: &str, iterations: u32) -> String {
    let mut acc = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        acc = Sha256::new()
            .chain_update(acc)
            .chain_update(password.as_bytes())
            .finalize();
    }
    format!("{acc:x}")
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn expiry(now: DateTime<Utc>, ttl_minutes: i64) -> Option<String> {
    (ttl_minutes > 0).then(|| (now + Duration::minutes(ttl_minutes)).to_rfc3339())
}

fn is_expired(expires_at: Option<&str>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => false,
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => t.with_timezone(&Utc) <= now,
            // Unreadable expiry: treat as expired.
            Err(_) => true,
        },
    }
}

/// Issues a new bearer token for the user and returns it in clear.
pub fn issue_access_token(
    conn: &Connection,
    user_id: &str,
    ttl_minutes: i64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO access_tokens(id, user_id, token_hash, created_at, expires_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            model::new_id(),
            user_id,
            hash_token(&token),
            now.to_rfc3339(),
            expiry(now, ttl_minutes),
        ),
    )?;
    Ok(token)
}

/// Resolves the caller of a request from its bearer token.
pub fn authenticate(conn: &Connection, token: Option<&str>) -> Result<User, ApiError> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Err(ApiError::unauthenticated());
    };
    let hash = hash_token(token);
    let row: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT id, user_id, expires_at FROM access_tokens WHERE token_hash = ?",
            [&hash],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((token_id, user_id, expires_at)) = row else {
        return Err(ApiError::unauthenticated());
    };

    let now = Utc::now();
    if is_expired(expires_at.as_deref(), now) {
        conn.execute("DELETE FROM access_tokens WHERE id = ?", [&token_id])?;
        debug!(user_id = %user_id, "rejected expired access token");
        return Err(ApiError::Unauthorized("token expired".into()));
    }
    conn.execute(
        "UPDATE access_tokens SET last_used_at = ? WHERE id = ?",
        (now.to_rfc3339(), &token_id),
    )?;

    user::find(conn, &user_id)?.ok_or_else(ApiError::unauthenticated)
}

/// Returns false when the token was not live.
pub fn revoke_access_token(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM access_tokens WHERE token_hash = ?",
        [hash_token(token.trim())],
    )?;
    Ok(n > 0)
}

pub fn revoke_all_access_tokens(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM access_tokens WHERE user_id = ?", [user_id])
}

/// Replaces any pending reset token of the user and returns the new one.
pub fn issue_reset_token(
    conn: &Connection,
    user: &User,
    ttl_minutes: i64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let now = Utc::now();
    let expires_at = (now + Duration::minutes(ttl_minutes.max(1))).to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM password_reset_tokens WHERE user_id = ?",
        [&user.id],
    )?;
    tx.execute(
        "INSERT INTO password_reset_tokens(id, user_id, email, token_hash, created_at, expires_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            model::new_id(),
            &user.id,
            &user.email,
            hash_token(&token),
            now.to_rfc3339(),
            expires_at,
        ),
    )?;
    tx.commit()?;
    Ok(token)
}

/// Checks a reset token against the email it was issued for and returns the
/// user it belongs to. The token is not consumed.
pub fn check_reset_token(conn: &Connection, token: &str, email: &str) -> Result<User, ApiError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT user_id, email, expires_at FROM password_reset_tokens WHERE token_hash = ?",
            [hash_token(token.trim())],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let invalid = || ApiError::field("token", "this password reset token is invalid");
    let Some((user_id, token_email, expires_at)) = row else {
        return Err(invalid());
    };
    if !token_email.eq_ignore_ascii_case(email.trim()) {
        return Err(invalid());
    }
    if is_expired(Some(&expires_at), Utc::now()) {
        conn.execute(
            "DELETE FROM password_reset_tokens WHERE user_id = ?",
            [&user_id],
        )?;
        return Err(invalid());
    }
    user::find(conn, &user_id)?.ok_or_else(invalid)
}

/// Link the browser client opens to finish a password reset.
pub fn reset_link(frontend_base_url: &str, token: &str, email: &str) -> String {
    format!(
        "{}/reset-password?token={}&email={}",
        frontend_base_url.trim_end_matches('/'),
        encode_query_value(token),
        encode_query_value(email)
    )
}

fn encode_query_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
