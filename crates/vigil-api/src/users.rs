use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use vigil_db::models::UserRow;
use vigil_db::time;
use vigil_types::api::{SetRoleRequest, UserListResponse, UserRef, UserSummary};
use vigil_types::models::Role;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::middleware::CurrentUser;

/// Superadmin user management view: active and banned partitions, active
/// ordered superadmin first, then by registration time.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_superadmin()?;

    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_users())
        .await
        .map_err(join_error)??;

    let (banned, active): (Vec<UserRow>, Vec<UserRow>) =
        rows.into_iter().partition(|u| u.banned);

    Ok(Json(UserListResponse {
        active: active.into_iter().map(user_summary).collect(),
        banned: banned.into_iter().map(user_summary).collect(),
    }))
}

/// Arbitrary role reassignment, self included. A superadmin demoting
/// themselves is allowed and takes effect on their next request.
pub async fn set_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_superadmin()?;

    state
        .db
        .set_role(&user_id.to_string(), req.role.as_str())?;

    Ok(Json(serde_json::json!({ "role": req.role })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_superadmin()?;
    state.db.delete_user(&user_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

fn user_summary(row: UserRow) -> UserSummary {
    let banned_by = match (row.banned_by_username, row.banned_by_email) {
        (Some(username), Some(email)) => Some(UserRef { username, email }),
        _ => None,
    };

    UserSummary {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt user id '{}': {}", row.id, e);
            Uuid::default()
        }),
        email: row.email,
        username: row.username,
        role: Role::parse(&row.role).unwrap_or(Role::Member),
        points: row.points,
        banned: row.banned,
        ban_reason: row.ban_reason,
        banned_by,
        created_at: time::decode(&row.created_at),
    }
}
