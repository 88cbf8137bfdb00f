use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use vigil_types::models::{Claims, Role};

use crate::auth::AppState;
use crate::error::ApiError;

/// Capability value derived from the profile row once per request.
/// Handlers check `role` on this instead of comparing role strings.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
}

impl CurrentUser {
    /// Authoring requires a claimed username. Accounts that registered but
    /// never finished the claim flow can manage their profile only; their
    /// email never reaches public content.
    pub fn require_username(&self) -> Result<&str, ApiError> {
        self.username.as_deref().ok_or_else(|| {
            ApiError::Forbidden("claim a username before posting or reacting".into())
        })
    }

    pub fn require_moderator(&self) -> Result<(), ApiError> {
        if self.role.is_moderator() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "this action requires a moderator role".into(),
            ))
        }
    }

    pub fn require_superadmin(&self) -> Result<(), ApiError> {
        if self.role.is_superadmin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "this action requires the superadmin role".into(),
            ))
        }
    }
}

/// Extract and validate the JWT, then reload the profile. The fresh read is
/// what makes bans and role changes take effect on the target's next request
/// even while an older token is still live.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let user = state
        .db
        .get_user_by_id(&token_data.claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?;

    if user.banned {
        return Err(ApiError::Banned);
    }

    let current = CurrentUser {
        id: token_data.claims.sub,
        email: user.email,
        username: user.username,
        role: Role::parse(&user.role).unwrap_or(Role::Member),
    };

    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(username: Option<&str>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "m@example.com".into(),
            username: username.map(String::from),
            role: Role::Member,
        }
    }

    #[test]
    fn authoring_requires_a_claimed_username() {
        assert_eq!(member(Some("alice")).require_username().unwrap(), "alice");

        let err = member(None).require_username().unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        // The rejection must not echo the account's email anywhere.
        assert!(!err.to_string().contains("m@example.com"));
    }

    #[test]
    fn member_fails_capability_checks() {
        let user = member(Some("alice"));
        assert!(user.require_moderator().is_err());
        assert!(user.require_superadmin().is_err());
    }
}
