use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::unique_conflict;
use crate::models::UserRow;
use crate::{Database, StoreError, time};

/// Minimum interval between username changes.
pub const USERNAME_CHANGE_COOLDOWN_DAYS: i64 = 14;

const USER_COLS: &str = "id, email, password, username, role, points, banned, ban_reason, \
     banned_by_username, banned_by_email, last_username_change, created_at";

impl Database {
    /// Creates the credential row. The profile stays unusable (username NULL)
    /// until the claim-username flow completes.
    pub fn create_account(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, email, password_hash, time::encode(now)],
            )
            .map_err(|e| unique_conflict(e, "email"))?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_user).optional()?)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], map_user).optional()?)
        })
    }

    /// Checked before credential verification on every register/login.
    pub fn is_email_banned(&self, email: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let hit: Option<String> = conn
                .query_row(
                    "SELECT email FROM banned_emails WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    /// Initial claim: username and credential land together. The UNIQUE
    /// constraint is the conditional insert that rejects a concurrent claim
    /// of the same name.
    pub fn claim_username(
        &self,
        user_id: &str,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn
                .execute(
                    "UPDATE users SET username = ?1, password = ?2, last_username_change = ?3
                     WHERE id = ?4",
                    params![username, password_hash, time::encode(now), user_id],
                )
                .map_err(|e| unique_conflict(e, "username"))?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// Changes the username and rewrites the denormalized display name on
    /// every comment by this user, in one transaction.
    pub fn change_username(
        &self,
        user_id: &str,
        new_username: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let last: Option<Option<String>> = tx
                .query_row(
                    "SELECT last_username_change FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let last = last.ok_or(StoreError::NotFound)?;

            if let Some(ts) = last {
                let elapsed = now - time::decode(&ts);
                if elapsed < Duration::days(USERNAME_CHANGE_COOLDOWN_DAYS) {
                    return Err(StoreError::RateLimited(format!(
                        "username can only be changed once every {USERNAME_CHANGE_COOLDOWN_DAYS} days"
                    )));
                }
            }

            tx.execute(
                "UPDATE users SET username = ?1, last_username_change = ?2 WHERE id = ?3",
                params![new_username, time::encode(now), user_id],
            )
            .map_err(|e| unique_conflict(e, "username"))?;

            tx.execute(
                "UPDATE comments SET author_username = ?1 WHERE author_id = ?2",
                params![new_username, user_id],
            )?;

            Ok(())
        })
    }

    pub fn update_password(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                params![password_hash, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_role(&self, user_id: &str, role: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role, user_id],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// Marks the profile banned and inserts the email-level ban record in the
    /// same transaction. Returns the banned email.
    pub fn ban_user(
        &self,
        user_id: &str,
        reason: &str,
        actor_username: &str,
        actor_email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        self.with_tx(|tx| {
            let email: String = tx
                .query_row("SELECT email FROM users WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or(StoreError::NotFound)?;

            tx.execute(
                "UPDATE users SET banned = 1, ban_reason = ?1,
                        banned_by_username = ?2, banned_by_email = ?3
                 WHERE id = ?4",
                params![reason, actor_username, actor_email, user_id],
            )?;

            tx.execute(
                "INSERT OR REPLACE INTO banned_emails (email, banned_at) VALUES (?1, ?2)",
                params![email, time::encode(now)],
            )?;

            Ok(email)
        })
    }

    pub fn unban_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let email: String = tx
                .query_row("SELECT email FROM users WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or(StoreError::NotFound)?;

            tx.execute(
                "UPDATE users SET banned = 0, ban_reason = NULL,
                        banned_by_username = NULL, banned_by_email = NULL
                 WHERE id = ?1",
                [user_id],
            )?;

            tx.execute("DELETE FROM banned_emails WHERE email = ?1", [&email])?;

            Ok(())
        })
    }

    /// Hard delete of profile + credential. Authored content stays behind
    /// with a dangling author id, matching the moderation read model's
    /// "Unknown" fallback.
    pub fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            if n == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    /// All profiles, superadmins first, then by registration time.
    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLS} FROM users
                 ORDER BY CASE role
                     WHEN 'superadmin' THEN 0
                     WHEN 'admin' THEN 1
                     ELSE 2
                 END, created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        username: row.get(3)?,
        role: row.get(4)?,
        points: row.get(5)?,
        banned: row.get::<_, i64>(6)? != 0,
        ban_reason: row.get(7)?,
        banned_by_username: row.get(8)?,
        banned_by_email: row.get(9)?,
        last_username_change: row.get(10)?,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = test_util::db();
        db.create_account("u1", "a@example.com", "h", Utc::now())
            .unwrap();
        let err = db
            .create_account("u2", "a@example.com", "h", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn username_claim_rejects_taken_name() {
        let db = test_util::db();
        test_util::seed_user(&db, "alice");
        db.create_account("u2", "b@example.com", "h", Utc::now())
            .unwrap();
        let err = db
            .claim_username("u2", "alice", "h", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn username_change_cooldown() {
        let db = test_util::db();
        let id = test_util::seed_user(&db, "alice");
        let claimed_at = Utc::now();

        let err = db
            .change_username(&id, "alice2", claimed_at + Duration::days(13))
            .unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(_)));

        db.change_username(&id, "alice2", claimed_at + Duration::days(15))
            .unwrap();
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("alice2"));
    }

    #[test]
    fn username_change_rewrites_comment_display_names() {
        let db = test_util::db();
        let author = test_util::seed_user(&db, "alice");
        let reader = test_util::seed_user(&db, "bob");
        let news = test_util::seed_article(&db, &reader);

        db.insert_comment(
            "c1", &news, &author, "alice", "interesting IOC list", None,
            Utc::now(),
        )
        .unwrap();

        db.change_username(&author, "alice2", Utc::now() + Duration::days(15))
            .unwrap();

        let comment = db.get_comment("c1").unwrap();
        assert_eq!(comment.author_username, "alice2");
    }

    #[test]
    fn ban_inserts_email_record_and_unban_removes_it() {
        let db = test_util::db();
        let target = test_util::seed_user(&db, "mallory");

        assert!(!db.is_email_banned("mallory@example.com").unwrap());

        db.ban_user(&target, "spam", "root", "root@example.com", Utc::now())
            .unwrap();
        assert!(db.is_email_banned("mallory@example.com").unwrap());

        let user = db.get_user_by_id(&target).unwrap().unwrap();
        assert!(user.banned);
        assert_eq!(user.ban_reason.as_deref(), Some("spam"));
        assert_eq!(user.banned_by_username.as_deref(), Some("root"));

        db.unban_user(&target).unwrap();
        assert!(!db.is_email_banned("mallory@example.com").unwrap());
        let user = db.get_user_by_id(&target).unwrap().unwrap();
        assert!(!user.banned);
        assert!(user.ban_reason.is_none());
    }

    #[test]
    fn list_users_orders_by_role_then_registration() {
        let db = test_util::db();
        let member = test_util::seed_user(&db, "carol");
        let admin = test_util::seed_user(&db, "dave");
        let root = test_util::seed_user(&db, "erin");
        db.set_role(&admin, "admin").unwrap();
        db.set_role(&root, "superadmin").unwrap();

        let users = db.list_users().unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![root.as_str(), admin.as_str(), member.as_str()]);
    }

    #[test]
    fn delete_user_removes_profile() {
        let db = test_util::db();
        let id = test_util::seed_user(&db, "gone");
        db.delete_user(&id).unwrap();
        assert!(db.get_user_by_id(&id).unwrap().is_none());
        assert!(matches!(
            db.delete_user(&id).unwrap_err(),
            StoreError::NotFound
        ));
    }
}
