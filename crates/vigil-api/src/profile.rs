use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use vigil_types::api::{
    ChangePasswordRequest, ChangeUsernameRequest, ClaimUsernameRequest, ProfileResponse,
};
use vigil_types::models::Role;

use crate::auth::{AppState, hash_password, verify_password};
use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_id(&current.id.to_string())?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(ProfileResponse {
        id: current.id,
        email: user.email,
        username: user.username,
        role: Role::parse(&user.role).unwrap_or(Role::Member),
        points: user.points,
    }))
}

/// Initial claim flow: username and password land together; the account is
/// unusable for authoring until this has run.
pub async fn claim_username(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ClaimUsernameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if current.username.is_some() {
        return Err(ApiError::Conflict(
            "this account already has a username; use the change flow".into(),
        ));
    }

    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() || req.confirm_password.is_empty() {
        return Err(ApiError::Validation("please fill in all fields".into()));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation("passwords do not match".into()));
    }
    validate_username(username)?;
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    state
        .db
        .claim_username(&current.id.to_string(), username, &password_hash, Utc::now())?;

    Ok(Json(serde_json::json!({ "username": username })))
}

/// Change flow: 14-day cooldown and re-authentication with the current
/// credential, both enforced before any write.
pub async fn change_username(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangeUsernameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_username = req.new_username.trim();
    if new_username.is_empty() || req.current_password.is_empty() {
        return Err(ApiError::Validation("please fill in all fields".into()));
    }
    validate_username(new_username)?;

    reauthenticate(&state, &current, &req.current_password)?;

    state
        .db
        .change_username(&current.id.to_string(), new_username, Utc::now())?;

    Ok(Json(serde_json::json!({ "username": new_username })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.current_password.is_empty()
        || req.new_password.is_empty()
        || req.confirm_password.is_empty()
    {
        return Err(ApiError::Validation("please fill in all fields".into()));
    }
    if req.new_password != req.confirm_password {
        return Err(ApiError::Validation("new passwords do not match".into()));
    }
    if req.new_password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    reauthenticate(&state, &current, &req.current_password)?;

    let password_hash = hash_password(&req.new_password)?;
    state
        .db
        .update_password(&current.id.to_string(), &password_hash)?;

    Ok(Json(serde_json::json!({ "changed": true })))
}

fn reauthenticate(
    state: &AppState,
    current: &CurrentUser,
    password: &str,
) -> Result<(), ApiError> {
    let user = state
        .db
        .get_user_by_id(&current.id.to_string())?
        .ok_or(ApiError::Unauthorized)?;
    if !verify_password(password, &user.password) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    Ok(())
}
