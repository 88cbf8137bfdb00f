pub mod error;
pub mod migrations;
pub mod models;

mod comments;
mod moderation;
mod news;
mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};
use tracing::info;

pub use error::StoreError;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn, &path.display().to_string())
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self, StoreError> {
        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", label);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside a single SQLite transaction. Every multi-row domain
    /// operation (like + points, cascade delete, username denormalization)
    /// goes through here so partial failure rolls back instead of leaving
    /// cross-table drift.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// comparison in SQL matches chronological order.
pub mod time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use tracing::warn;

    pub fn encode(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn decode(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                warn!("Corrupt timestamp '{}': {}", s, e);
                DateTime::default()
            })
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::Database;
    use crate::models::ArticleFields;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let email = format!("{username}@example.com");
        db.create_account(&id, &email, "argon2-hash", Utc::now())
            .unwrap();
        db.claim_username(&id, username, "argon2-hash", Utc::now())
            .unwrap();
        id
    }

    pub fn seed_article(db: &Database, author_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_news(
            &id,
            &ArticleFields {
                title: "Emotet resurgence in EU finance",
                country: "Germany",
                threat_actor: "TA542",
                case_date: "2024-03-05",
                description: "Phishing wave delivering Emotet loaders.",
                ioc: "45.153.186.12, invoice-march.doc",
                mitre_attack: "T1566.001, T1204.002",
                recommendation: None,
            },
            author_id,
            Utc::now(),
        )
        .unwrap();
        id
    }
}
