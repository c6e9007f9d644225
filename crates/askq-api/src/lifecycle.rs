//! Question lifecycle: the only writer of question state.
//!
//! Every owner-scoped operation checks the caller before touching storage.
//! Notifications go out after the write commits and are best-effort: a failed
//! publish is logged, never rolled back.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use askq_db::Database;
use askq_db::models::{QuestionRow, Transition};
use askq_gateway::bus::EventBus;
use askq_types::api::{Claims, PinnedQuestionResponse};
use askq_types::channels;
use askq_types::events::QueueEvent;
use askq_types::models::{MAX_QUESTION_LEN, Question, QuestionStatus, Settings};

use crate::db_call;
use crate::error::QueueError;

/// Owner of a queue, by id or by (case-insensitive) display name.
#[derive(Debug, Clone)]
pub enum OwnerRef {
    Id(Uuid),
    Username(String),
}

#[derive(Clone)]
pub struct QueueService {
    db: Arc<Database>,
    bus: Arc<dyn EventBus>,
}

impl QueueService {
    pub fn new(db: Arc<Database>, bus: Arc<dyn EventBus>) -> Self {
        Self { db, bus }
    }

    /// Add a question to `owner_id`'s queue and tell the owner's dashboards to refetch.
    pub async fn submit(
        &self,
        owner_id: Uuid,
        body: String,
        submitter: Option<&Claims>,
    ) -> Result<Question, QueueError> {
        if body.chars().count() > MAX_QUESTION_LEN {
            return Err(QueueError::Validation(format!(
                "Question must be at most {} characters",
                MAX_QUESTION_LEN
            )));
        }

        let author_id = submitter.map(|c| c.sub.to_string());
        let question_id = Uuid::new_v4().to_string();
        let owner = owner_id.to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let row = db_call(&self.db, move |db| {
            if db.get_user_by_id(&owner)?.is_none() {
                return Ok(Err(QueueError::NotFound));
            }
            let requires_login = db.get_requires_login(&owner)?.unwrap_or(false);
            if requires_login && author_id.is_none() {
                return Ok(Err(QueueError::Unauthorized));
            }

            db.insert_question(&question_id, &owner, &body, author_id.as_deref(), &created_at)?;
            let row = db
                .get_question(&question_id)?
                .ok_or_else(|| anyhow!("Question vanished after insert: {}", question_id))?;
            Ok(Ok(row))
        })
        .await??;

        let question = question_from_row(row)?;
        info!("New question {} for {}", question.id, owner_id);
        self.notify(owner_id, QueueEvent::NewQuestion {});
        Ok(question)
    }

    /// Pending and pinned questions of the caller, oldest first.
    pub async fn list_active(&self, caller: Option<&Claims>) -> Result<Vec<Question>, QueueError> {
        let owner = caller.ok_or(QueueError::Unauthorized)?.sub.to_string();

        let rows = db_call(&self.db, move |db| db.get_active_questions(&owner)).await?;
        rows.into_iter()
            .map(|row| question_from_row(row).map_err(QueueError::from))
            .collect()
    }

    /// Pin a question, demoting whatever the caller had pinned before.
    pub async fn pin(&self, caller: Option<&Claims>, question_id: Uuid) -> Result<Question, QueueError> {
        let owner_id = caller.ok_or(QueueError::Unauthorized)?.sub;
        let owner = owner_id.to_string();
        let id = question_id.to_string();

        let row = match db_call(&self.db, move |db| db.pin_question(&owner, &id)).await? {
            Transition::Applied(row) => row,
            Transition::Missing => return Err(QueueError::NotFound),
            Transition::Foreign => return Err(QueueError::NotYours),
        };

        let question = question_from_row(row)?;
        info!("{} pinned question {}", owner_id, question.id);
        self.notify(
            owner_id,
            QueueEvent::QuestionPinned {
                question: question.body.clone(),
                author: question.author_id.and(question.author_name.clone()),
            },
        );
        Ok(question)
    }

    /// Clear the caller's pinned question. A no-op when nothing is pinned.
    pub async fn unpin(&self, caller: Option<&Claims>) -> Result<(), QueueError> {
        let owner_id = caller.ok_or(QueueError::Unauthorized)?.sub;
        let owner = owner_id.to_string();

        let was_pinned = db_call(&self.db, move |db| db.unpin_question(&owner)).await?;
        if was_pinned {
            info!("{} unpinned their question", owner_id);
            self.notify(owner_id, QueueEvent::QuestionUnpinned {});
        }
        Ok(())
    }

    /// Mark a question answered. Archiving the pinned question also unpins it.
    pub async fn archive(&self, caller: Option<&Claims>, question_id: Uuid) -> Result<(), QueueError> {
        let owner_id = caller.ok_or(QueueError::Unauthorized)?.sub;
        let owner = owner_id.to_string();
        let id = question_id.to_string();

        let was_pinned = match db_call(&self.db, move |db| db.archive_question(&owner, &id)).await? {
            Transition::Applied(was_pinned) => was_pinned,
            Transition::Missing => return Err(QueueError::NotFound),
            Transition::Foreign => return Err(QueueError::NotYours),
        };

        info!("{} archived question {}", owner_id, question_id);
        if was_pinned {
            self.notify(owner_id, QueueEvent::QuestionUnpinned {});
        }
        Ok(())
    }

    /// Archive every pending question of the caller at once.
    pub async fn archive_all(&self, caller: Option<&Claims>) -> Result<(), QueueError> {
        let owner_id = caller.ok_or(QueueError::Unauthorized)?.sub;
        let owner = owner_id.to_string();

        let archived = db_call(&self.db, move |db| db.archive_pending_questions(&owner)).await?;
        info!("{} archived {} pending questions", owner_id, archived);
        Ok(())
    }

    /// Currently pinned question of an owner; public, for the overlay's first render.
    pub async fn pinned(&self, owner_id: Uuid) -> Result<Option<PinnedQuestionResponse>, QueueError> {
        let owner = owner_id.to_string();
        let row = db_call(&self.db, move |db| db.get_pinned_question(&owner)).await?;

        Ok(row.map(|row| PinnedQuestionResponse {
            author: row.author_id.and(row.author_name),
            question: row.body,
        }))
    }

    /// Whether the owner only accepts questions from signed-in viewers.
    /// Owners without settings accept anonymous questions.
    pub async fn login_required(&self, owner: OwnerRef) -> Result<bool, QueueError> {
        let value = db_call(&self.db, move |db| match owner {
            OwnerRef::Id(id) => db.get_requires_login(&id.to_string()),
            OwnerRef::Username(name) => db.get_requires_login_by_username(&name),
        })
        .await?;
        Ok(value.unwrap_or(false))
    }

    pub async fn set_requires_login(
        &self,
        caller: Option<&Claims>,
        requires_login: bool,
    ) -> Result<Settings, QueueError> {
        let owner_id = caller.ok_or(QueueError::Unauthorized)?.sub;
        let owner = owner_id.to_string();

        let requires_login =
            db_call(&self.db, move |db| db.set_requires_login(&owner, requires_login)).await?;
        info!("{} set requires_login={}", owner_id, requires_login);
        Ok(Settings { requires_login })
    }

    fn notify(&self, owner_id: Uuid, event: QueueEvent) {
        let channel = channels::owner_channel(owner_id);
        let name = event.name();
        if let Err(e) = self.bus.publish(&channel, event) {
            warn!("Failed to publish {} on {}: {}", name, channel, e);
        }
    }
}

pub(crate) fn question_from_row(row: QuestionRow) -> anyhow::Result<Question> {
    let status = QuestionStatus::parse(&row.status)
        .ok_or_else(|| anyhow!("Corrupt status '{}' on question '{}'", row.status, row.id))?;

    let author_id = match row.author_id.as_deref() {
        Some(id) => Some(
            id.parse::<Uuid>()
                .map_err(|e| anyhow!("Corrupt author_id '{}' on question '{}': {}", id, row.id, e))?,
        ),
        None => None,
    };

    Ok(Question {
        id: row
            .id
            .parse()
            .map_err(|e| anyhow!("Corrupt question id '{}': {}", row.id, e))?,
        owner_user_id: row
            .owner_id
            .parse()
            .map_err(|e| anyhow!("Corrupt owner_id '{}' on question '{}': {}", row.owner_id, row.id, e))?,
        created_at: parse_timestamp(&row.created_at)
            .ok_or_else(|| anyhow!("Corrupt created_at '{}' on question '{}'", row.created_at, row.id))?,
        body: row.body,
        author_id,
        author_name: row.author_name,
        status,
    })
}

/// Accepts RFC 3339 and SQLite's `datetime('now')` format (naive UTC).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    value.parse::<DateTime<Utc>>().ok().or_else(|| {
        chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}
