use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            provider_account_id TEXT NOT NULL UNIQUE,
            username            TEXT NOT NULL UNIQUE COLLATE NOCASE,
            image               TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS moderators (
            user_id     TEXT NOT NULL REFERENCES users(id),
            login       TEXT NOT NULL COLLATE NOCASE,
            PRIMARY KEY (user_id, login)
        );

        CREATE TABLE IF NOT EXISTS settings (
            user_id         TEXT PRIMARY KEY REFERENCES users(id),
            requires_login  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS questions (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            author_id   TEXT,
            status      TEXT NOT NULL DEFAULT 'PENDING'
                        CHECK (status IN ('PENDING', 'PINNED', 'ANSWERED')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_questions_owner_status
            ON questions(owner_id, status);

        -- At most one pinned question per owner
        CREATE UNIQUE INDEX IF NOT EXISTS idx_questions_one_pinned
            ON questions(owner_id) WHERE status = 'PINNED';
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
