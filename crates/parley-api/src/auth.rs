use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use parley_db::{Database, StoreError};
use parley_types::api::{Claims, LoginRequest, RegisterRequest, TokenResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: AuthConfig,
}

/// Process-wide signing secret and hashing work factor, passed in at
/// construction rather than read from the environment at call sites.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub hash_m_cost_kib: u32,
    pub hash_t_cost: u32,
    pub hash_p_cost: u32,
    pub token_ttl_days: i64,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            hash_m_cost_kib: Params::DEFAULT_M_COST,
            hash_t_cost: Params::DEFAULT_T_COST,
            hash_p_cost: Params::DEFAULT_P_COST,
            token_ttl_days: 30,
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>, ApiError> {
        let params = Params::new(self.hash_m_cost_kib, self.hash_t_cost, self.hash_p_cost, None)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid hash params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be 3-32 characters".into(),
        ));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".into()));
    }

    let password_hash = hash_password(&state.config, &req.password)?;

    // join_at and last_login_at are both stamped at insert.
    let user = state
        .db
        .create_user(
            &req.username,
            &password_hash,
            &req.first_name,
            &req.last_name,
            &req.phone,
        )
        .map_err(|err| match err {
            StoreError::Conflict => {
                ApiError::Conflict(format!("username {} is taken", req.username))
            }
            other => other.into(),
        })?;

    let token = create_token(&state.config, &user.username)?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !authenticate(&state.db, &req.username, &req.password)? {
        return Err(ApiError::Unauthorized("invalid username/password".into()));
    }

    // Awaited rather than dispatched in the background, so the timestamp
    // is durable by the time the token reaches the caller.
    if state.db.update_last_login(&req.username)? == 0 {
        return Err(ApiError::NotFound(format!("no such user: {}", req.username)));
    }

    let token = create_token(&state.config, &req.username)?;

    Ok(Json(TokenResponse { token }))
}

/// Credential check. Returns false for an unknown username or a wrong
/// password; callers learn nothing beyond the boolean.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<bool, ApiError> {
    let Some(stored) = db.get_user_password(username)? else {
        return Ok(false);
    };

    let parsed = PasswordHash::new(&stored)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn hash_password(config: &AuthConfig, password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = config
        .hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn create_token(config: &AuthConfig, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(config.token_ttl_days)).timestamp()
            as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            // Minimal work factor to keep the suite fast.
            hash_m_cost_kib: 8,
            hash_t_cost: 1,
            hash_p_cost: 1,
            token_ttl_days: 1,
        }
    }

    fn db_with_user(username: &str, password: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        let hash = hash_password(&test_config(), password).unwrap();
        db.create_user(username, &hash, "First", "Last", "555-0000")
            .unwrap();
        db
    }

    #[test]
    fn authenticate_accepts_correct_password() {
        let db = db_with_user("alice", "correct horse");
        assert!(authenticate(&db, "alice", "correct horse").unwrap());
    }

    #[test]
    fn authenticate_rejects_wrong_password() {
        let db = db_with_user("alice", "correct horse");
        assert!(!authenticate(&db, "alice", "battery staple").unwrap());
    }

    #[test]
    fn authenticate_unknown_user_is_false_not_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(!authenticate(&db, "nobody", "anything").unwrap());
    }

    #[test]
    fn password_hash_is_not_plaintext() {
        let hash = hash_password(&test_config(), "hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter22"));
    }

    #[test]
    fn hashes_are_salted() {
        let config = test_config();
        let a = hash_password(&config, "same password").unwrap();
        let b = hash_password(&config, "same password").unwrap();
        assert_ne!(a, b);
    }
}
