use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use vigil_db::Database;
use vigil_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use vigil_types::models::{Claims, Role};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    // The ban list is consulted before any credential work.
    if state.db.is_email_banned(&email)? {
        return Err(ApiError::Banned);
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    state
        .db
        .create_account(&user_id.to_string(), &email, &password_hash, Utc::now())?;

    let token = create_token(&state.jwt_secret, user_id, &email)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            email,
            username: None,
            role: Role::Member,
            token,
            needs_username: true,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "email and password are required".into(),
        ));
    }

    if state.db.is_email_banned(&email)? {
        return Err(ApiError::Banned);
    }

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::Unauthorized)?;

    if user.banned {
        return Err(ApiError::Banned);
    }

    if !verify_password(&req.password, &user.password) {
        return Err(ApiError::Unauthorized);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {e}", user.id)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.email)?;
    let needs_username = user.username.is_none();

    Ok(Json(AuthResponse {
        user_id,
        email: user.email,
        username: user.username,
        role: Role::parse(&user.role).unwrap_or(Role::Member),
        token,
        needs_username,
    }))
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn create_token(secret: &str, user_id: Uuid, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter22hunter22").unwrap();
        assert!(verify_password("hunter22hunter22", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("hunter22hunter22", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn banned_email_is_rejected_before_credentials() {
        let db = Database::open_in_memory().unwrap();
        db.create_account("u1", "mallory@example.com", "hash", Utc::now())
            .unwrap();
        db.ban_user("u1", "spam", "root", "root@example.com", Utc::now())
            .unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db,
            jwt_secret: "test-secret".into(),
        });

        let err = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "mallory@example.com".into(),
                password: "longenough".into(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Banned));

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "mallory@example.com".into(),
                password: "longenough".into(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Banned));
    }

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = create_token("test-secret", id, "a@example.com").unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, id);
        assert_eq!(data.claims.email, "a@example.com");
    }
}
