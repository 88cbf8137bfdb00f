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

use vigil_db::models::CommentRow;
use vigil_db::time;
use vigil_types::api::{CommentView, CreatedResponse, LikeResponse, PostCommentRequest};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::middleware::CurrentUser;

pub async fn list_comments(
    State(state): State<AppState>,
    Path(news_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let nid = news_id.to_string();

    let (rows, like_rows) = tokio::task::spawn_blocking(move || {
        // Listing against a deleted article is a NotFound, not an empty page.
        db.db.get_news(&nid)?;
        let rows = db.db.list_comments(&nid)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let like_rows = db.db.get_likes_for_comments(&ids)?;
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

    Ok(Json(build_thread(rows, &mut likers)))
}

pub async fn post_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(news_id): Path<Uuid>,
    Json(req): Json<PostCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author_username = current.require_username()?;
    if req.text.trim().is_empty() {
        return Err(ApiError::Validation("comment cannot be empty".into()));
    }

    let id = Uuid::new_v4();
    let parent = req.parent_id.map(|p| p.to_string());

    state.db.insert_comment(
        &id.to_string(),
        &news_id.to_string(),
        &current.id.to_string(),
        author_username,
        req.text.trim(),
        parent.as_deref(),
        Utc::now(),
    )?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Author-only. Moderators delete through the moderation routes instead.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.db.get_comment(&comment_id.to_string())?;
    if row.author_id != current.id.to_string() {
        return Err(ApiError::Forbidden(
            "you can only delete your own comment".into(),
        ));
    }

    state.db.delete_comment(&comment_id.to_string())?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    current.require_username()?;
    let (liked, likes) = state.db.toggle_comment_like(
        &comment_id.to_string(),
        &current.id.to_string(),
        Utc::now(),
    )?;

    Ok(Json(LikeResponse { liked, likes }))
}

/// Shapes a flat, oldest-first comment list into the two-level thread the
/// client renders: top-level newest-first, replies oldest-first.
pub(crate) fn build_thread(
    rows: Vec<CommentRow>,
    likers: &mut HashMap<String, Vec<Uuid>>,
) -> Vec<CommentView> {
    let mut replies: HashMap<String, Vec<CommentView>> = HashMap::new();
    let mut top_level: Vec<CommentView> = Vec::new();

    for row in rows {
        let parent = row.parent_id.clone();
        let liked_by = likers.remove(&row.id).unwrap_or_default();
        let view = comment_view(row, liked_by);

        match parent {
            None => top_level.push(view),
            Some(parent_id) => replies.entry(parent_id).or_default().push(view),
        }
    }

    top_level.reverse();
    for comment in &mut top_level {
        if let Some(children) = replies.remove(&comment.id.to_string()) {
            comment.replies = children;
        }
    }

    for orphan in replies.values().flatten() {
        warn!("Orphaned reply '{}' with no visible parent", orphan.id);
    }

    top_level
}

pub(crate) fn comment_view(row: CommentRow, liked_by: Vec<Uuid>) -> CommentView {
    CommentView {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt comment id '{}': {}", row.id, e);
            Uuid::default()
        }),
        article_id: row.news_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt news_id on comment '{}': {}", row.id, e);
            Uuid::default()
        }),
        author_id: row.author_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt author_id on comment '{}': {}", row.id, e);
            Uuid::default()
        }),
        author_username: row.author_username,
        text: row.body,
        parent_id: row.parent_id.and_then(|p| p.parse().ok()),
        created_at: time::decode(&row.created_at),
        likes: liked_by.len(),
        liked_by,
        replies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn row(body: &str, parent: Option<&str>, offset_secs: i64) -> CommentRow {
        CommentRow {
            id: Uuid::new_v4().to_string(),
            news_id: Uuid::new_v4().to_string(),
            author_id: Uuid::new_v4().to_string(),
            author_username: "alice".into(),
            body: body.to_string(),
            parent_id: parent.map(String::from),
            created_at: time::encode(Utc::now() + Duration::seconds(offset_secs)),
        }
    }

    #[test]
    fn thread_orders_top_level_newest_first_and_replies_oldest_first() {
        let first = row("a", None, 0);
        let top_a = first.id.clone();
        let second = row("b", None, 10);
        let top_b = second.id.clone();
        let reply_one = row("r1", Some(&top_a), 20);
        let reply_one_id = reply_one.id.clone();
        let reply_two = row("r2", Some(&top_a), 30);
        let reply_two_id = reply_two.id.clone();

        // Rows arrive oldest-first, as the store returns them.
        let rows = vec![first, second, reply_one, reply_two];
        let thread = build_thread(rows, &mut HashMap::new());

        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].id.to_string(), top_b);
        assert_eq!(thread[1].id.to_string(), top_a);
        assert!(thread[0].replies.is_empty());

        let replies: Vec<String> = thread[1]
            .replies
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(replies, vec![reply_one_id, reply_two_id]);
    }

    #[test]
    fn likes_are_attached_to_the_right_comment() {
        let top = row("a", None, 0);
        let top_id = top.id.clone();
        let liker = Uuid::new_v4();

        let mut likers = HashMap::from([(top_id.clone(), vec![liker])]);
        let thread = build_thread(vec![top], &mut likers);

        assert_eq!(thread[0].likes, 1);
        assert_eq!(thread[0].liked_by, vec![liker]);
    }
}
