use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                    TEXT PRIMARY KEY,
            email                 TEXT NOT NULL UNIQUE,
            password              TEXT NOT NULL,
            username              TEXT UNIQUE,
            role                  TEXT NOT NULL DEFAULT 'member',
            points                INTEGER NOT NULL DEFAULT 0,
            banned                INTEGER NOT NULL DEFAULT 0,
            ban_reason            TEXT,
            banned_by_username    TEXT,
            banned_by_email       TEXT,
            last_username_change  TEXT,
            created_at            TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS banned_emails (
            email       TEXT PRIMARY KEY,
            banned_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS news (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            country         TEXT NOT NULL,
            threat_actor    TEXT NOT NULL,
            case_date       TEXT NOT NULL,
            description     TEXT NOT NULL,
            ioc             TEXT NOT NULL,
            mitre_attack    TEXT NOT NULL,
            recommendation  TEXT,
            author_id       TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_news_created
            ON news(created_at);

        CREATE TABLE IF NOT EXISTS news_likes (
            news_id     TEXT NOT NULL REFERENCES news(id),
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (news_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id               TEXT PRIMARY KEY,
            news_id          TEXT NOT NULL REFERENCES news(id),
            author_id        TEXT NOT NULL,
            author_username  TEXT NOT NULL,
            body             TEXT NOT NULL,
            parent_id        TEXT REFERENCES comments(id),
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_news
            ON comments(news_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_comments_author
            ON comments(author_id, created_at);

        CREATE TABLE IF NOT EXISTS comment_likes (
            comment_id  TEXT NOT NULL REFERENCES comments(id),
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (comment_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reported_news (
            id           TEXT PRIMARY KEY,
            news_id      TEXT NOT NULL REFERENCES news(id),
            reported_by  TEXT NOT NULL,
            reason       TEXT NOT NULL,
            reported_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reported_news_target
            ON reported_news(news_id);

        CREATE TABLE IF NOT EXISTS reported_comments (
            id           TEXT PRIMARY KEY,
            comment_id   TEXT NOT NULL REFERENCES comments(id),
            reported_by  TEXT NOT NULL,
            reason       TEXT NOT NULL,
            reported_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reported_comments_target
            ON reported_comments(comment_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
