use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use vigil_db::models::ProfileRef;
use vigil_db::time;
use vigil_types::api::{BanRequest, ReportRequest, ReportTarget, ReportView, UserRef};

use crate::auth::AppState;
use crate::comments::comment_view;
use crate::error::{ApiError, join_error};
use crate::middleware::CurrentUser;
use crate::news::article_response;

pub async fn report_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_username()?;
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::Validation("report reason cannot be empty".into()));
    }

    let id = Uuid::new_v4();
    state.db.insert_news_report(
        &id.to_string(),
        &news_id.to_string(),
        &current.id.to_string(),
        reason,
        Utc::now(),
    )?;

    Ok(StatusCode::CREATED)
}

pub async fn report_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<Uuid>,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_username()?;
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::Validation("report reason cannot be empty".into()));
    }

    let id = Uuid::new_v4();
    state.db.insert_comment_report(
        &id.to_string(),
        &comment_id.to_string(),
        &current.id.to_string(),
        reason,
        Utc::now(),
    )?;

    Ok(StatusCode::CREATED)
}

/// Moderator queue: both report kinds merged, newest first, with reporter,
/// target content, and target author denormalized in.
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;

    let db = state.clone();
    let (news_reports, comment_reports, news_likes, comment_likes) =
        tokio::task::spawn_blocking(move || {
            let news_reports = db.db.list_news_reports()?;
            let comment_reports = db.db.list_comment_reports()?;

            let news_ids: Vec<String> =
                news_reports.iter().map(|d| d.news.id.clone()).collect();
            let comment_ids: Vec<String> = comment_reports
                .iter()
                .map(|d| d.comment.id.clone())
                .collect();

            let news_likes = db.db.get_likes_for_news(&news_ids)?;
            let comment_likes = db.db.get_likes_for_comments(&comment_ids)?;

            Ok::<_, vigil_db::StoreError>((
                news_reports,
                comment_reports,
                news_likes,
                comment_likes,
            ))
        })
        .await
        .map_err(join_error)??;

    let mut news_likers: HashMap<String, Vec<Uuid>> = HashMap::new();
    for like in &news_likes {
        if let Ok(uid) = like.user_id.parse::<Uuid>() {
            news_likers
                .entry(like.target_id.clone())
                .or_default()
                .push(uid);
        }
    }
    let mut comment_likers: HashMap<String, Vec<Uuid>> = HashMap::new();
    for like in &comment_likes {
        if let Ok(uid) = like.user_id.parse::<Uuid>() {
            comment_likers
                .entry(like.target_id.clone())
                .or_default()
                .push(uid);
        }
    }

    let mut views: Vec<ReportView> = Vec::new();

    for detail in news_reports {
        let liked_by = news_likers.remove(&detail.news.id).unwrap_or_default();
        views.push(ReportView {
            report_id: parse_report_id(&detail.report.id),
            reason: detail.report.reason,
            reported_at: time::decode(&detail.report.reported_at),
            reporter: user_ref(detail.reporter),
            target: ReportTarget::Article {
                content: article_response(detail.news, liked_by),
                author: user_ref(detail.author),
            },
        });
    }

    for detail in comment_reports {
        let liked_by = comment_likers
            .remove(&detail.comment.id)
            .unwrap_or_default();
        views.push(ReportView {
            report_id: parse_report_id(&detail.report.id),
            reason: detail.report.reason,
            reported_at: time::decode(&detail.report.reported_at),
            reporter: user_ref(detail.reporter),
            target: ReportTarget::Comment {
                content: comment_view(detail.comment, liked_by),
                author: user_ref(detail.author),
            },
        });
    }

    views.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));

    Ok(Json(views))
}

/// Resolve a report by deleting the article it points at. Reuses the full
/// article cascade, which also removes every report on it.
pub async fn remove_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    state.db.delete_news(&news_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a report by deleting the comment. Authorship is not re-checked;
/// the moderator capability is the authority here.
pub async fn remove_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    state.db.delete_comment(&comment_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dismiss_news_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(report_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    state.db.delete_news_report(&report_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dismiss_comment_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(report_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    state.db.delete_comment_report(&report_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ban_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<BanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    let actor_username = current.require_username()?;

    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::Validation("ban reason cannot be empty".into()));
    }

    state.db.ban_user(
        &user_id.to_string(),
        reason,
        actor_username,
        &current.email,
        Utc::now(),
    )?;

    Ok(Json(serde_json::json!({ "banned": true })))
}

pub async fn unban_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_moderator()?;
    state.db.unban_user(&user_id.to_string())?;
    Ok(Json(serde_json::json!({ "banned": false })))
}

fn user_ref(profile: Option<ProfileRef>) -> UserRef {
    match profile {
        Some(p) => UserRef {
            username: p.username.unwrap_or_else(|| "Unknown".to_string()),
            email: p.email,
        },
        None => UserRef {
            username: "Unknown".to_string(),
            email: "Unknown".to_string(),
        },
    }
}

fn parse_report_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        tracing::warn!("Corrupt report id '{}': {}", raw, e);
        Uuid::default()
    })
}
