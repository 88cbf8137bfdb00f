use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::models::{
    CommentReportDetail, CommentReportRow, CommentRow, NewsReportDetail, NewsReportRow, NewsRow,
    ProfileRef,
};
use crate::{Database, StoreError, time};

impl Database {
    /// Files a report against an article. Authors cannot report their own.
    pub fn insert_news_report(
        &self,
        id: &str,
        news_id: &str,
        reported_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let author: String = tx
                .query_row(
                    "SELECT author_id FROM news WHERE id = ?1",
                    [news_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if author == reported_by {
                return Err(StoreError::OwnContent);
            }

            tx.execute(
                "INSERT INTO reported_news (id, news_id, reported_by, reason, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, news_id, reported_by, reason, time::encode(now)],
            )?;

            Ok(())
        })
    }

    pub fn insert_comment_report(
        &self,
        id: &str,
        comment_id: &str,
        reported_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let author: String = tx
                .query_row(
                    "SELECT author_id FROM comments WHERE id = ?1",
                    [comment_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if author == reported_by {
                return Err(StoreError::OwnContent);
            }

            tx.execute(
                "INSERT INTO reported_comments (id, comment_id, reported_by, reason, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, comment_id, reported_by, reason, time::encode(now)],
            )?;

            Ok(())
        })
    }

    /// Moderator queue for reported articles, newest report first. The inner
    /// join filters reports whose target died in a concurrent delete.
    pub fn list_news_reports(&self) -> Result<Vec<NewsReportDetail>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.news_id, r.reported_by, r.reason, r.reported_at,
                        n.id, n.title, n.country, n.threat_actor, n.case_date, n.description,
                        n.ioc, n.mitre_attack, n.recommendation, n.author_id, n.created_at,
                        a.username, a.email,
                        rep.username, rep.email
                 FROM reported_news r
                 JOIN news n ON n.id = r.news_id
                 LEFT JOIN users a ON a.id = n.author_id
                 LEFT JOIN users rep ON rep.id = r.reported_by
                 ORDER BY r.reported_at DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    let author_username: Option<String> = row.get(16)?;
                    Ok(NewsReportDetail {
                        report: NewsReportRow {
                            id: row.get(0)?,
                            news_id: row.get(1)?,
                            reported_by: row.get(2)?,
                            reason: row.get(3)?,
                            reported_at: row.get(4)?,
                        },
                        news: NewsRow {
                            id: row.get(5)?,
                            title: row.get(6)?,
                            country: row.get(7)?,
                            threat_actor: row.get(8)?,
                            case_date: row.get(9)?,
                            description: row.get(10)?,
                            ioc: row.get(11)?,
                            mitre_attack: row.get(12)?,
                            recommendation: row.get(13)?,
                            author_id: row.get(14)?,
                            author_username: author_username
                                .clone()
                                .unwrap_or_else(|| "unknown".to_string()),
                            created_at: row.get(15)?,
                        },
                        author: profile_ref(author_username, row.get(17)?),
                        reporter: profile_ref(row.get(18)?, row.get(19)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Moderator queue for reported comments, newest report first.
    pub fn list_comment_reports(&self) -> Result<Vec<CommentReportDetail>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.comment_id, r.reported_by, r.reason, r.reported_at,
                        c.id, c.news_id, c.author_id, c.author_username, c.body, c.parent_id,
                        c.created_at,
                        a.username, a.email,
                        rep.username, rep.email
                 FROM reported_comments r
                 JOIN comments c ON c.id = r.comment_id
                 LEFT JOIN users a ON a.id = c.author_id
                 LEFT JOIN users rep ON rep.id = r.reported_by
                 ORDER BY r.reported_at DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(CommentReportDetail {
                        report: CommentReportRow {
                            id: row.get(0)?,
                            comment_id: row.get(1)?,
                            reported_by: row.get(2)?,
                            reason: row.get(3)?,
                            reported_at: row.get(4)?,
                        },
                        comment: CommentRow {
                            id: row.get(5)?,
                            news_id: row.get(6)?,
                            author_id: row.get(7)?,
                            author_username: row.get(8)?,
                            body: row.get(9)?,
                            parent_id: row.get(10)?,
                            created_at: row.get(11)?,
                        },
                        author: profile_ref(row.get(12)?, row.get(13)?),
                        reporter: profile_ref(row.get(14)?, row.get(15)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Dismisses a report, leaving the content intact.
    pub fn delete_news_report(&self, id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM reported_news WHERE id = ?1", [id])?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn delete_comment_report(&self, id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM reported_comments WHERE id = ?1", [id])?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }
}

fn profile_ref(username: Option<String>, email: Option<String>) -> Option<ProfileRef> {
    email.map(|email| ProfileRef { username, email })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn self_report_is_rejected_for_any_role() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let news = test_util::seed_article(&db, &author);

        for role in ["member", "admin", "superadmin"] {
            db.set_role(&author, role).unwrap();
            let err = db
                .insert_news_report("r", &news, &author, "looks wrong", Utc::now())
                .unwrap_err();
            assert!(matches!(err, StoreError::OwnContent));
        }
    }

    #[test]
    fn report_then_moderator_delete_clears_the_queue() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "dora");
        let reporter = test_util::seed_user(&db, "carl");
        let news = test_util::seed_article(&db, &author);
        let now = Utc::now();

        db.insert_comment("m", &news, &author, "dora", "spam link", None, now)
            .unwrap();
        db.insert_comment_report("rep", "m", &reporter, "spam", now)
            .unwrap();

        let listed = db.list_comment_reports().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment.id, "m");
        assert_eq!(
            listed[0].reporter.as_ref().unwrap().username.as_deref(),
            Some("carl")
        );

        db.delete_comment("m").unwrap();

        assert!(matches!(
            db.get_comment("m").unwrap_err(),
            StoreError::NotFound
        ));
        assert!(db.list_comment_reports().unwrap().is_empty());
    }

    #[test]
    fn dismissing_a_report_keeps_the_content() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let reporter = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);

        db.insert_news_report("rep", &news, &reporter, "dupe", Utc::now())
            .unwrap();
        assert_eq!(db.list_news_reports().unwrap().len(), 1);

        db.delete_news_report("rep").unwrap();
        assert!(db.list_news_reports().unwrap().is_empty());
        db.get_news(&news).unwrap();
    }

    #[test]
    fn report_against_missing_target_is_not_found() {
        let db = test_util::db();
        let reporter = test_util::seed_user(&db, "bob");
        let err = db
            .insert_news_report("rep", "ghost", &reporter, "reason", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn deleted_author_shows_as_unknown_in_queue() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let reporter = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &author);

        db.insert_news_report("rep", &news, &reporter, "reason", Utc::now())
            .unwrap();
        db.delete_user(&author).unwrap();

        let listed = db.list_news_reports().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].author.is_none());
        assert_eq!(listed[0].news.author_username, "unknown");
    }
}
