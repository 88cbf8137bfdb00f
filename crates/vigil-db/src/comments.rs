use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};

use crate::models::{CommentRow, LikeRow};
use crate::news::POINTS_PER_LIKE;
use crate::{Database, StoreError, time};

/// At most this many comment-or-reply creations per author per rolling window.
pub const COMMENT_RATE_LIMIT: usize = 3;
pub const COMMENT_RATE_WINDOW_SECS: i64 = 3600;

const COMMENT_COLS: &str = "id, news_id, author_id, author_username, body, parent_id, created_at";

impl Database {
    /// Persists a comment or single-level reply. Enforces the rolling-window
    /// rate limit against stored creation timestamps at submission time; no
    /// counter is persisted.
    pub fn insert_comment(
        &self,
        id: &str,
        news_id: &str,
        author_id: &str,
        author_username: &str,
        body: &str,
        parent_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let news_exists: Option<String> = tx
                .query_row("SELECT id FROM news WHERE id = ?1", [news_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if news_exists.is_none() {
                return Err(StoreError::NotFound);
            }

            if let Some(parent) = parent_id {
                let parent_row: Option<(String, Option<String>)> = tx
                    .query_row(
                        "SELECT news_id, parent_id FROM comments WHERE id = ?1",
                        [parent],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match parent_row {
                    None => {
                        return Err(StoreError::Invalid(
                            "parent comment does not exist".into(),
                        ));
                    }
                    Some((parent_news, _)) if parent_news != news_id => {
                        return Err(StoreError::Invalid(
                            "parent comment belongs to a different article".into(),
                        ));
                    }
                    Some((_, Some(_))) => {
                        // Thread depth is exactly two: no replies to replies.
                        return Err(StoreError::Invalid(
                            "replies cannot be nested".into(),
                        ));
                    }
                    Some(_) => {}
                }
            }

            let cutoff = time::encode(now - Duration::seconds(COMMENT_RATE_WINDOW_SECS));
            let recent: i64 = tx.query_row(
                "SELECT COUNT(*) FROM comments WHERE author_id = ?1 AND created_at > ?2",
                params![author_id, cutoff],
                |row| row.get(0),
            )?;
            if recent as usize >= COMMENT_RATE_LIMIT {
                return Err(StoreError::RateLimited(format!(
                    "you can only comment {COMMENT_RATE_LIMIT} times in an hour"
                )));
            }

            tx.execute(
                "INSERT INTO comments (id, news_id, author_id, author_username, body,
                                       parent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    news_id,
                    author_id,
                    author_username,
                    body,
                    parent_id,
                    time::encode(now),
                ],
            )?;

            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<CommentRow, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {COMMENT_COLS} FROM comments WHERE id = ?1");
            conn.query_row(&sql, [id], map_comment)
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    /// All comments of an article, oldest first. Thread shaping (top-level
    /// newest-first, replies oldest-first) happens in the API layer.
    pub fn list_comments(&self, news_id: &str) -> Result<Vec<CommentRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMMENT_COLS} FROM comments
                 WHERE news_id = ?1 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([news_id], map_comment)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes a comment. A top-level comment takes its replies with it,
    /// along with like rows and reports for everything removed.
    pub fn delete_comment(&self, id: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM comments WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound);
            }

            tx.execute(
                "DELETE FROM reported_comments WHERE comment_id IN
                     (SELECT id FROM comments WHERE parent_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM reported_comments WHERE comment_id = ?1", [id])?;
            tx.execute(
                "DELETE FROM comment_likes WHERE comment_id IN
                     (SELECT id FROM comments WHERE parent_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM comment_likes WHERE comment_id = ?1", [id])?;
            tx.execute("DELETE FROM comments WHERE parent_id = ?1", [id])?;
            tx.execute("DELETE FROM comments WHERE id = ?1", [id])?;

            Ok(())
        })
    }

    /// Same contract as the article like toggle; the comment's author
    /// receives the points.
    pub fn toggle_comment_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(bool, usize), StoreError> {
        self.with_tx(|tx| {
            let author: String = tx
                .query_row(
                    "SELECT author_id FROM comments WHERE id = ?1",
                    [comment_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if author == user_id {
                return Err(StoreError::OwnContent);
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                    params![comment_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let liked = if existing.is_some() {
                tx.execute(
                    "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                    params![comment_id, user_id],
                )?;
                tx.execute(
                    "UPDATE users SET points = points - ?1 WHERE id = ?2",
                    params![POINTS_PER_LIKE, author],
                )?;
                false
            } else {
                tx.execute(
                    "INSERT INTO comment_likes (comment_id, user_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![comment_id, user_id, time::encode(now)],
                )?;
                tx.execute(
                    "UPDATE users SET points = points + ?1 WHERE id = ?2",
                    params![POINTS_PER_LIKE, author],
                )?;
                true
            };

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
                [comment_id],
                |row| row.get(0),
            )?;

            Ok((liked, count as usize))
        })
    }

    pub fn get_comment_likers(&self, comment_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM comment_likes WHERE comment_id = ?1")?;
            let rows = stmt
                .query_map([comment_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch like rows for a set of comment IDs.
    pub fn get_likes_for_comments(
        &self,
        comment_ids: &[String],
    ) -> Result<Vec<LikeRow>, StoreError> {
        if comment_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=comment_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT comment_id, user_id FROM comment_likes WHERE comment_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = comment_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(LikeRow {
                        target_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        news_id: row.get(1)?,
        author_id: row.get(2)?,
        author_username: row.get(3)?,
        body: row.get(4)?,
        parent_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn fourth_comment_in_window_is_rate_limited() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let poster = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        for i in 0..3 {
            db.insert_comment(
                &format!("c{i}"),
                &news,
                &poster,
                "bob",
                "text",
                None,
                now,
            )
            .unwrap();
        }

        let err = db
            .insert_comment("c3", &news, &poster, "bob", "text", None, now)
            .unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(_)));

        // 3601 s after the oldest of the three the window has moved on.
        db.insert_comment(
            "c4",
            &news,
            &poster,
            "bob",
            "text",
            None,
            now + Duration::seconds(COMMENT_RATE_WINDOW_SECS + 1),
        )
        .unwrap();
    }

    #[test]
    fn replies_count_against_the_rate_limit() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let poster = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("top", &news, &author, "alice", "top", None, now)
            .unwrap();
        db.insert_comment("r1", &news, &poster, "bob", "a", Some("top"), now)
            .unwrap();
        db.insert_comment("r2", &news, &poster, "bob", "b", Some("top"), now)
            .unwrap();
        db.insert_comment("c1", &news, &poster, "bob", "c", None, now)
            .unwrap();

        let err = db
            .insert_comment("c2", &news, &poster, "bob", "d", None, now)
            .unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(_)));
    }

    #[test]
    fn reply_to_a_reply_is_rejected() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("top", &news, &author, "alice", "top", None, now)
            .unwrap();
        db.insert_comment("reply", &news, &author, "alice", "reply", Some("top"), now)
            .unwrap();

        let err = db
            .insert_comment("deep", &news, &author, "alice", "deep", Some("reply"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn reply_must_stay_on_the_same_article() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let news_a = test_util::seed_article(&db, &author);
        let news_b = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("top", &news_a, &author, "alice", "top", None, now)
            .unwrap();

        let err = db
            .insert_comment("stray", &news_b, &author, "alice", "stray", Some("top"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn deleting_top_level_comment_cascades_replies_and_reports() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let other = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("top", &news, &author, "alice", "top", None, now)
            .unwrap();
        db.insert_comment("reply", &news, &other, "bob", "reply", Some("top"), now)
            .unwrap();
        db.toggle_comment_like("reply", &author, now).unwrap();
        db.insert_comment_report("rep", "reply", &author, "abuse", now)
            .unwrap();

        db.delete_comment("top").unwrap();

        assert!(matches!(
            db.get_comment("top").unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            db.get_comment("reply").unwrap_err(),
            StoreError::NotFound
        ));
        assert!(db.list_comments(&news).unwrap().is_empty());
        assert!(db.list_comment_reports().unwrap().is_empty());
    }

    #[test]
    fn comment_like_toggle_moves_points() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let poster = test_util::seed_user(&db, "bob");
        let liker = test_util::seed_user(&db, "carol");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("c", &news, &poster, "bob", "text", None, now)
            .unwrap();

        let (liked, count) = db.toggle_comment_like("c", &liker, now).unwrap();
        assert!(liked);
        assert_eq!(count, 1);
        assert_eq!(db.get_user_by_id(&poster).unwrap().unwrap().points, 10);

        let err = db.toggle_comment_like("c", &poster, now).unwrap_err();
        assert!(matches!(err, StoreError::OwnContent));

        let (liked, count) = db.toggle_comment_like("c", &liker, now).unwrap();
        assert!(!liked);
        assert_eq!(count, 0);
        assert_eq!(db.get_user_by_id(&poster).unwrap().unwrap().points, 0);
    }
}
