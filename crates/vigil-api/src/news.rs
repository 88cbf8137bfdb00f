use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use vigil_db::models::{ArticleFields, NewsRow};
use vigil_db::time;
use vigil_types::api::{ArticleRequest, ArticleResponse, CreatedResponse, LikeResponse};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::middleware::CurrentUser;

pub async fn list_news(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // Run blocking DB reads off the async runtime
    let db = state.clone();
    let (rows, like_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_news()?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let like_rows = db.db.get_likes_for_news(&ids)?;
        Ok::<_, vigil_db::StoreError>((rows, like_rows))
    })
    .await
    .map_err(join_error)??;

    let mut likers: HashMap<String, Vec<Uuid>> = HashMap::new();
    for like in &like_rows {
        if let Ok(uid) = like.user_id.parse::<Uuid>() {
            likers.entry(like.target_id.clone()).or_default().push(uid);
        }
    }

    let articles: Vec<ArticleResponse> = rows
        .into_iter()
        .map(|row| {
            let liked_by = likers.remove(&row.id).unwrap_or_default();
            article_response(row, liked_by)
        })
        .collect();

    Ok(Json(articles))
}

/// The caller's own articles, for the authored-content view.
pub async fn list_my_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let author_id = current.id.to_string();
    let (rows, like_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_news_by_author(&author_id)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let like_rows = db.db.get_likes_for_news(&ids)?;
        Ok::<_, vigil_db::StoreError>((rows, like_rows))
    })
    .await
    .map_err(join_error)??;

    let mut likers: HashMap<String, Vec<Uuid>> = HashMap::new();
    for like in &like_rows {
        if let Ok(uid) = like.user_id.parse::<Uuid>() {
            likers.entry(like.target_id.clone()).or_default().push(uid);
        }
    }

    let articles: Vec<ArticleResponse> = rows
        .into_iter()
        .map(|row| {
            let liked_by = likers.remove(&row.id).unwrap_or_default();
            article_response(row, liked_by)
        })
        .collect();

    Ok(Json(articles))
}

pub async fn get_news(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.db.get_news(&news_id.to_string())?;
    let liked_by = parse_ids(state.db.get_news_likers(&news_id.to_string())?);
    Ok(Json(article_response(row, liked_by)))
}

pub async fn create_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ArticleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_username()?;
    let fields = validated_fields(&req)?;
    let id = Uuid::new_v4();

    state.db.insert_news(
        &id.to_string(),
        &fields,
        &current.id.to_string(),
        Utc::now(),
    )?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn update_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
    Json(req): Json<ArticleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.db.get_news(&news_id.to_string())?;
    require_owner_or_moderator(&row, &current, "edit")?;

    let fields = validated_fields(&req)?;
    state.db.update_news(&news_id.to_string(), &fields)?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn delete_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.db.get_news(&news_id.to_string())?;
    require_owner_or_moderator(&row, &current, "delete")?;

    state.db.delete_news(&news_id.to_string())?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_news(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_username()?;
    let (liked, likes) =
        state
            .db
            .toggle_news_like(&news_id.to_string(), &current.id.to_string(), Utc::now())?;

    Ok(Json(LikeResponse { liked, likes }))
}

/// Article edits and deletes are open to the author and to moderators only.
fn require_owner_or_moderator(
    row: &NewsRow,
    current: &CurrentUser,
    action: &str,
) -> Result<(), ApiError> {
    if row.author_id == current.id.to_string() || current.role.is_moderator() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "only the author or a moderator can {action} this article"
        )))
    }
}

fn validated_fields<'a>(req: &'a ArticleRequest) -> Result<ArticleFields<'a>, ApiError> {
    let required = [
        ("title", &req.title),
        ("country", &req.country),
        ("threat actor", &req.threat_actor),
        ("case date", &req.case_date),
        ("description", &req.description),
        ("ioc", &req.ioc),
        ("mitre attack", &req.mitre_attack),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{name} is required")));
        }
    }

    Ok(ArticleFields {
        title: req.title.trim(),
        country: req.country.trim(),
        threat_actor: req.threat_actor.trim(),
        case_date: req.case_date.trim(),
        description: &req.description,
        ioc: &req.ioc,
        mitre_attack: &req.mitre_attack,
        recommendation: req.recommendation.as_deref(),
    })
}

pub(crate) fn article_response(row: NewsRow, liked_by: Vec<Uuid>) -> ArticleResponse {
    ArticleResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt news id '{}': {}", row.id, e);
            Uuid::default()
        }),
        title: row.title,
        country: row.country,
        threat_actor: row.threat_actor,
        case_date: row.case_date,
        description: row.description,
        ioc: row.ioc,
        mitre_attack: row.mitre_attack,
        recommendation: row.recommendation,
        author_id: row.author_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt author_id on news '{}': {}", row.id, e);
            Uuid::default()
        }),
        author_username: row.author_username,
        created_at: time::decode(&row.created_at),
        likes: liked_by.len(),
        liked_by,
    }
}

pub(crate) fn parse_ids(raw: Vec<String>) -> Vec<Uuid> {
    raw.into_iter()
        .filter_map(|s| match s.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Corrupt user id '{}': {}", s, e);
                None
            }
        })
        .collect()
}
