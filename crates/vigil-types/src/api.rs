use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by both register and login. `needs_username` routes the client
/// to the claim-username flow before the profile is usable.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
    pub token: String,
    pub needs_username: bool,
}

// -- Profile --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimUsernameRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeUsernameRequest {
    pub new_username: String,
    pub current_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
    pub points: i64,
}

// -- Articles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleRequest {
    pub title: String,
    pub country: String,
    pub threat_actor: String,
    pub case_date: String,
    pub description: String,
    pub ioc: String,
    pub mitre_attack: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleResponse {
    pub id: Uuid,
    pub title: String,
    pub country: String,
    pub threat_actor: String,
    pub case_date: String,
    pub description: String,
    pub ioc: String,
    pub mitre_attack: String,
    pub recommendation: Option<String>,
    pub author_id: Uuid,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub likes: usize,
    pub liked_by: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// Result of a like toggle on an article or comment.
#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes: usize,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostCommentRequest {
    pub text: String,
    pub parent_id: Option<Uuid>,
}

/// One comment in a thread. Top-level comments carry their replies
/// (oldest-first); replies always have an empty `replies` vec.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub article_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub text: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub likes: usize,
    pub liked_by: Vec<Uuid>,
    pub replies: Vec<CommentView>,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BanRequest {
    pub reason: String,
}

/// Username/email pair shown to moderators. Profiles deleted since the
/// referenced action fall back to "Unknown".
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportTarget {
    Article {
        content: ArticleResponse,
        author: UserRef,
    },
    Comment {
        content: CommentView,
        author: UserRef,
    },
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub report_id: Uuid,
    pub reason: String,
    pub reported_at: DateTime<Utc>,
    pub reporter: UserRef,
    pub target: ReportTarget,
}

// -- User administration --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub role: Role,
    pub points: i64,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub banned_by: Option<UserRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub active: Vec<UserSummary>,
    pub banned: Vec<UserSummary>,
}
