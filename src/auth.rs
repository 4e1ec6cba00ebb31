// Identity Service
// Registration, login, Argon2id password storage, and HS256 JWT issuance
// and verification. The rest of the crate only ever sees PublicUser and
// the user id a verified token resolves to.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

/// User fields safe to expose in API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Successful register/login payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: PublicUser,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

// ============================================================================
// PASSWORDS
// ============================================================================

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// Sign a token carrying the user id, expiring after `ttl_hours`.
pub fn issue_token(user_id: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token issuance failed: {}", e)))
}

/// Verify a bearer token and return the user id it was issued for.
/// Expiry is checked; any failure collapses to a single 401 message.
pub fn verify_token(token: &str, secret: &str) -> Result<String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::unauthorized("Invalid or expired token"))?;

    Ok(data.claims.sub)
}

// ============================================================================
// USERS
// ============================================================================

/// Register a new user and issue a token for them.
pub fn register(
    conn: &Connection,
    name: &str,
    email: &str,
    password: &str,
    jwt_secret: &str,
    token_ttl_hours: i64,
) -> Result<AuthSession> {
    let name = name.trim();
    let email = email.trim().to_lowercase();

    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    if password.len() < 6 {
        return Err(AppError::validation("Password must be at least 6 characters"));
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM users WHERE email = ?1)",
        [&email],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::validation("Email already registered"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(password)?;

    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, email, password_hash, Utc::now().to_rfc3339()],
    )?;

    debug!(user_id = %id, "registered user");

    let token = issue_token(&id, jwt_secret, token_ttl_hours)?;
    Ok(AuthSession {
        user: PublicUser {
            id,
            name: name.to_string(),
            email,
        },
        token,
    })
}

/// Log a user in with email and password.
///
/// Unknown email and wrong password fail with the same message so the
/// endpoint does not leak which emails are registered.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    jwt_secret: &str,
    token_ttl_hours: i64,
) -> Result<AuthSession> {
    let email = email.trim().to_lowercase();

    let row = conn
        .query_row(
            "SELECT id, name, email, password_hash FROM users WHERE email = ?1",
            [&email],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let (id, name, email, stored_hash) =
        row.ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !verify_password(password, &stored_hash) {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let token = issue_token(&id, jwt_secret, token_ttl_hours)?;
    Ok(AuthSession {
        user: PublicUser { id, name, email },
        token,
    })
}

/// Look a user up by id.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<PublicUser> {
    conn.query_row(
        "SELECT id, name, email FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(PublicUser {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("User not found"))
}

/// Look a user up by email; unknown emails are not an error here (group
/// creation silently ignores them).
pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<PublicUser>> {
    let email = email.trim().to_lowercase();

    Ok(conn
        .query_row(
            "SELECT id, name, email FROM users WHERE email = ?1",
            [&email],
            |row| {
                Ok(PublicUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .optional()?)
}

// ============================================================================
// TESTS
// ============================================================================
