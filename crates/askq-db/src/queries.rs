use crate::models::{QuestionRow, Transition, UserRow};
use crate::Database;
use anyhow::Result;
use askq_types::models::QuestionStatus;
use rusqlite::{Connection, params};

const QUESTION_SELECT: &str = "SELECT q.id, q.owner_id, q.body, q.author_id, u.username, q.status, q.created_at
     FROM questions q
     LEFT JOIN users u ON q.author_id = u.id";

impl Database {
    // -- Users --

    /// Create the user on first sign-in, otherwise refresh the profile.
    /// Moderators are merged into the stored list, never replaced.
    /// Returns the stored row and whether it was just created.
    pub fn upsert_user(
        &self,
        new_id: &str,
        provider_account_id: &str,
        username: &str,
        image: Option<&str>,
        moderators: &[String],
    ) -> Result<(UserRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Platform names get recycled. A stale row still holding this name
            // gives it up; `~` never appears in a platform login.
            tx.execute(
                "UPDATE users SET username = '~' || id
                 WHERE username = ?1 COLLATE NOCASE AND provider_account_id != ?2",
                params![username, provider_account_id],
            )?;

            let existing = query_user(&tx, "provider_account_id = ?1", provider_account_id)?;
            let (user_id, created) = match existing {
                Some(user) => {
                    tx.execute(
                        "UPDATE users SET username = ?2, image = COALESCE(?3, image) WHERE id = ?1",
                        params![user.id, username, image],
                    )?;
                    (user.id, false)
                }
                None => {
                    tx.execute(
                        "INSERT INTO users (id, provider_account_id, username, image) VALUES (?1, ?2, ?3, ?4)",
                        params![new_id, provider_account_id, username, image],
                    )?;
                    (new_id.to_string(), true)
                }
            };

            for login in moderators {
                tx.execute(
                    "INSERT OR IGNORE INTO moderators (user_id, login) VALUES (?1, ?2)",
                    params![user_id, login],
                )?;
            }

            let row = query_user(&tx, "id = ?1", &user_id)?
                .ok_or_else(|| anyhow::anyhow!("User vanished during sign-in: {}", user_id))?;
            tx.commit()?;
            Ok((row, created))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Case-insensitive lookup by display name.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1 COLLATE NOCASE", username))
    }

    pub fn get_user_by_provider_account(&self, provider_account_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "provider_account_id = ?1", provider_account_id))
    }

    // -- Moderators --

    pub fn get_moderators(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT login FROM moderators WHERE user_id = ?1 ORDER BY login")?;
            let logins = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(logins)
        })
    }

    pub fn add_moderator(&self, user_id: &str, login: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO moderators (user_id, login) VALUES (?1, ?2)",
                params![user_id, login],
            )?;
            Ok(())
        })
    }

    pub fn remove_moderator(&self, user_id: &str, login: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM moderators WHERE user_id = ?1 AND login = ?2",
                params![user_id, login],
            )?;
            Ok(())
        })
    }

    /// Whether `login` moderates the channel named `channel_username`.
    pub fn is_moderator(&self, channel_username: &str, login: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM moderators m
                     JOIN users u ON m.user_id = u.id
                     WHERE u.username = ?1 COLLATE NOCASE AND m.login = ?2",
                    params![channel_username, login],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Settings --

    /// `None` when the user never saved settings.
    pub fn get_requires_login(&self, user_id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT requires_login FROM settings WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn get_requires_login_by_username(&self, username: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT s.requires_login FROM settings s
                     JOIN users u ON s.user_id = u.id
                     WHERE u.username = ?1 COLLATE NOCASE",
                    [username],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_requires_login(&self, user_id: &str, requires_login: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO settings (user_id, requires_login) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET requires_login = excluded.requires_login",
                params![user_id, requires_login],
            )?;
            Ok(requires_login)
        })
    }

    // -- Questions --

    pub fn insert_question(
        &self,
        id: &str,
        owner_id: &str,
        body: &str,
        author_id: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO questions (id, owner_id, body, author_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner_id, body, author_id, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_question(&self, id: &str) -> Result<Option<QuestionRow>> {
        self.with_conn(|conn| query_question(conn, id))
    }

    /// Pending and pinned questions, oldest submission first.
    pub fn get_active_questions(&self, owner_id: &str) -> Result<Vec<QuestionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{QUESTION_SELECT}
                 WHERE q.owner_id = ?1 AND q.status IN ('PENDING', 'PINNED')
                 ORDER BY q.seq ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], map_question)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_pinned_question(&self, owner_id: &str) -> Result<Option<QuestionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{QUESTION_SELECT} WHERE q.owner_id = ?1 AND q.status = 'PINNED'");
            let row = conn.query_row(&sql, [owner_id], map_question).optional()?;
            Ok(row)
        })
    }

    /// Pin `id`, demoting any other pinned question of the same owner first.
    /// Both updates commit together, so no reader sees two pinned questions.
    pub fn pin_question(&self, owner_id: &str, id: &str) -> Result<Transition<QuestionRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            match check_active(&tx, owner_id, id)? {
                Transition::Applied(_) => {}
                Transition::Missing => return Ok(Transition::Missing),
                Transition::Foreign => return Ok(Transition::Foreign),
            }

            tx.execute(
                "UPDATE questions SET status = 'PENDING'
                 WHERE owner_id = ?1 AND status = 'PINNED' AND id != ?2",
                params![owner_id, id],
            )?;
            tx.execute("UPDATE questions SET status = 'PINNED' WHERE id = ?1", [id])?;

            let row = query_question(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Question vanished while pinning: {}", id))?;
            tx.commit()?;
            Ok(Transition::Applied(row))
        })
    }

    /// Returns whether a question was pinned before the call.
    pub fn unpin_question(&self, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE questions SET status = 'PENDING' WHERE owner_id = ?1 AND status = 'PINNED'",
                [owner_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Move an active question to ANSWERED. `Applied(true)` means it was the
    /// pinned one, which leaves the owner with nothing pinned.
    pub fn archive_question(&self, owner_id: &str, id: &str) -> Result<Transition<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let status = match check_active(&tx, owner_id, id)? {
                Transition::Applied(status) => status,
                Transition::Missing => return Ok(Transition::Missing),
                Transition::Foreign => return Ok(Transition::Foreign),
            };

            tx.execute("UPDATE questions SET status = 'ANSWERED' WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Transition::Applied(status == QuestionStatus::Pinned))
        })
    }

    /// Archive every pending question of the owner in one statement.
    pub fn archive_pending_questions(&self, owner_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE questions SET status = 'ANSWERED' WHERE owner_id = ?1 AND status = 'PENDING'",
                [owner_id],
            )?;
            Ok(changed)
        })
    }
}

/// Ownership and liveness check shared by the transitions. Yields the current status.
fn check_active(conn: &Connection, owner_id: &str, id: &str) -> Result<Transition<QuestionStatus>> {
    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT owner_id, status FROM questions WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match found {
        None => Transition::Missing,
        Some((owner, _)) if owner != owner_id => Transition::Foreign,
        Some((_, status)) => match QuestionStatus::parse(&status) {
            Some(status) if status.is_active() => Transition::Applied(status),
            _ => Transition::Missing,
        },
    })
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, provider_account_id, username, image, created_at FROM users WHERE {predicate}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                provider_account_id: row.get(1)?,
                username: row.get(2)?,
                image: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_question(conn: &Connection, id: &str) -> Result<Option<QuestionRow>> {
    let sql = format!("{QUESTION_SELECT} WHERE q.id = ?1");
    let row = conn.query_row(&sql, [id], map_question).optional()?;
    Ok(row)
}

fn map_question(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuestionRow> {
    Ok(QuestionRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        body: row.get(2)?,
        author_id: row.get(3)?,
        author_name: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
