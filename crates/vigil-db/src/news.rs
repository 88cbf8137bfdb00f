use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::models::{ArticleFields, LikeRow, NewsRow};
use crate::{Database, StoreError, time};

/// Reputation granted to an author per like on their content.
pub const POINTS_PER_LIKE: i64 = 10;

const NEWS_COLS: &str = "n.id, n.title, n.country, n.threat_actor, n.case_date, n.description, \
     n.ioc, n.mitre_attack, n.recommendation, n.author_id, u.username, n.created_at";

impl Database {
    pub fn insert_news(
        &self,
        id: &str,
        fields: &ArticleFields<'_>,
        author_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO news (id, title, country, threat_actor, case_date, description,
                                   ioc, mitre_attack, recommendation, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    fields.title,
                    fields.country,
                    fields.threat_actor,
                    fields.case_date,
                    fields.description,
                    fields.ioc,
                    fields.mitre_attack,
                    fields.recommendation,
                    author_id,
                    time::encode(now),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_news(&self, id: &str) -> Result<NewsRow, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NEWS_COLS} FROM news n
                 LEFT JOIN users u ON n.author_id = u.id
                 WHERE n.id = ?1"
            );
            conn.query_row(&sql, [id], map_news)
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    /// Front page: newest first.
    pub fn list_news(&self) -> Result<Vec<NewsRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NEWS_COLS} FROM news n
                 LEFT JOIN users u ON n.author_id = u.id
                 ORDER BY n.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_news)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One user's articles, newest first.
    pub fn list_news_by_author(&self, author_id: &str) -> Result<Vec<NewsRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NEWS_COLS} FROM news n
                 LEFT JOIN users u ON n.author_id = u.id
                 WHERE n.author_id = ?1
                 ORDER BY n.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], map_news)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_news(&self, id: &str, fields: &ArticleFields<'_>) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE news SET title = ?1, country = ?2, threat_actor = ?3, case_date = ?4,
                        description = ?5, ioc = ?6, mitre_attack = ?7, recommendation = ?8
                 WHERE id = ?9",
                params![
                    fields.title,
                    fields.country,
                    fields.threat_actor,
                    fields.case_date,
                    fields.description,
                    fields.ioc,
                    fields.mitre_attack,
                    fields.recommendation,
                    id,
                ],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// Deletes the article together with its comments, every report that
    /// references the article or one of those comments, and all like rows.
    /// One transaction, so a partial cascade cannot be observed.
    pub fn delete_news(&self, id: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM news WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound);
            }

            tx.execute(
                "DELETE FROM reported_comments WHERE comment_id IN
                     (SELECT id FROM comments WHERE news_id = ?1)",
                [id],
            )?;
            tx.execute(
                "DELETE FROM comment_likes WHERE comment_id IN
                     (SELECT id FROM comments WHERE news_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM comments WHERE news_id = ?1", [id])?;
            tx.execute("DELETE FROM reported_news WHERE news_id = ?1", [id])?;
            tx.execute("DELETE FROM news_likes WHERE news_id = ?1", [id])?;
            tx.execute("DELETE FROM news WHERE id = ?1", [id])?;

            Ok(())
        })
    }

    /// Like toggle. Inserts or removes the like row and moves the author's
    /// points by the same amount in one transaction, so the like count and
    /// the points total cannot drift apart. Self-likes are rejected.
    pub fn toggle_news_like(
        &self,
        news_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(bool, usize), StoreError> {
        self.with_tx(|tx| {
            let author: String = tx
                .query_row(
                    "SELECT author_id FROM news WHERE id = ?1",
                    [news_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if author == user_id {
                return Err(StoreError::OwnContent);
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM news_likes WHERE news_id = ?1 AND user_id = ?2",
                    params![news_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let liked = if existing.is_some() {
                tx.execute(
                    "DELETE FROM news_likes WHERE news_id = ?1 AND user_id = ?2",
                    params![news_id, user_id],
                )?;
                tx.execute(
                    "UPDATE users SET points = points - ?1 WHERE id = ?2",
                    params![POINTS_PER_LIKE, author],
                )?;
                false
            } else {
                tx.execute(
                    "INSERT INTO news_likes (news_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![news_id, user_id, time::encode(now)],
                )?;
                tx.execute(
                    "UPDATE users SET points = points + ?1 WHERE id = ?2",
                    params![POINTS_PER_LIKE, author],
                )?;
                true
            };

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM news_likes WHERE news_id = ?1",
                [news_id],
                |row| row.get(0),
            )?;

            Ok((liked, count as usize))
        })
    }

    pub fn get_news_likers(&self, news_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM news_likes WHERE news_id = ?1")?;
            let rows = stmt
                .query_map([news_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch like rows for a page of articles.
    pub fn get_likes_for_news(&self, news_ids: &[String]) -> Result<Vec<LikeRow>, StoreError> {
        if news_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=news_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT news_id, user_id FROM news_likes WHERE news_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = news_ids
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

fn map_news(row: &rusqlite::Row<'_>) -> rusqlite::Result<NewsRow> {
    Ok(NewsRow {
        id: row.get(0)?,
        title: row.get(1)?,
        country: row.get(2)?,
        threat_actor: row.get(3)?,
        case_date: row.get(4)?,
        description: row.get(5)?,
        ioc: row.get(6)?,
        mitre_attack: row.get(7)?,
        recommendation: row.get(8)?,
        author_id: row.get(9)?,
        author_username: row
            .get::<_, Option<String>>(10)?
            .unwrap_or_else(|| "unknown".to_string()),
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn like_then_unlike_moves_author_points() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let liker = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);

        let (liked, count) = db.toggle_news_like(&news, &liker, Utc::now()).unwrap();
        assert!(liked);
        assert_eq!(count, 1);
        assert_eq!(db.get_news_likers(&news).unwrap(), vec![liker.clone()]);
        assert_eq!(db.get_user_by_id(&author).unwrap().unwrap().points, 10);

        let (liked, count) = db.toggle_news_like(&news, &liker, Utc::now()).unwrap();
        assert!(!liked);
        assert_eq!(count, 0);
        assert!(db.get_news_likers(&news).unwrap().is_empty());
        assert_eq!(db.get_user_by_id(&author).unwrap().unwrap().points, 0);
    }

    #[test]
    fn self_like_is_rejected() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let news = test_util::seed_article(&db, &author);

        let err = db.toggle_news_like(&news, &author, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::OwnContent));
        assert_eq!(db.get_user_by_id(&author).unwrap().unwrap().points, 0);
    }

    #[test]
    fn like_count_matches_liker_set() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let b = test_util::seed_user(&db, "bob");
        let c = test_util::seed_user(&db, "carol");
        let news = test_util::seed_article(&db, &author);

        db.toggle_news_like(&news, &b, Utc::now()).unwrap();
        let (_, count) = db.toggle_news_like(&news, &c, Utc::now()).unwrap();
        assert_eq!(count, db.get_news_likers(&news).unwrap().len());
        assert_eq!(count, 2);
    }

    #[test]
    fn delete_cascades_comments_reports_and_likes() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let other = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);

        db.insert_comment("c1", &news, &other, "bob", "first", None, Utc::now())
            .unwrap();
        db.insert_comment("c2", &news, &other, "bob", "reply", Some("c1"), Utc::now())
            .unwrap();
        db.toggle_comment_like("c1", &author, Utc::now()).unwrap();
        db.insert_news_report("r1", &news, &other, "fake intel", Utc::now())
            .unwrap();
        db.insert_comment_report("r2", "c1", &author, "abuse", Utc::now())
            .unwrap();

        db.delete_news(&news).unwrap();

        assert!(matches!(db.get_news(&news).unwrap_err(), StoreError::NotFound));
        assert!(db.list_comments(&news).unwrap().is_empty());
        assert!(db.list_news_reports().unwrap().is_empty());
        assert!(db.list_comment_reports().unwrap().is_empty());
    }

    #[test]
    fn author_listing_only_contains_their_articles() {
        let db = test_util::db();
        let alice = test_util::seed_user(&db, "alice");
        let bob = test_util::seed_user(&db, "bob");
        let first = test_util::seed_article(&db, &alice);
        test_util::seed_article(&db, &bob);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = test_util::seed_article(&db, &alice);

        let rows = db.list_news_by_author(&alice).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);

        assert!(db.list_news_by_author("ghost").unwrap().is_empty());
    }

    #[test]
    fn list_news_is_newest_first() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let older = test_util::seed_article(&db, &author);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = test_util::seed_article(&db, &author);

        let rows = db.list_news().unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.as_str(), older.as_str()]);
    }
}
