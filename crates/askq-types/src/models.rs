use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest question body accepted by submission, in characters.
pub const MAX_QUESTION_LEN: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Pending,
    Pinned,
    Answered,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Pinned => "PINNED",
            Self::Answered => "ANSWERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PINNED" => Some(Self::Pinned),
            "ANSWERED" => Some(Self::Answered),
            _ => None,
        }
    }

    /// Answered is terminal: nothing moves out of it.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Answered)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub requires_login: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub body: String,
    pub author_id: Option<Uuid>,
    /// Display name of the author, when the submitter was signed in.
    pub author_name: Option<String>,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Name shown next to the body; anonymous submissions render as "Anonymous".
    pub fn display_author(&self) -> &str {
        match (&self.author_id, &self.author_name) {
            (Some(_), Some(name)) => name,
            _ => "Anonymous",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [QuestionStatus::Pending, QuestionStatus::Pinned, QuestionStatus::Answered] {
            assert_eq!(QuestionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QuestionStatus::parse("pinned"), None);
    }

    #[test]
    fn anonymous_questions_display_as_anonymous() {
        let mut q = Question {
            id: Uuid::new_v4(),
            owner_user_id: Uuid::new_v4(),
            body: "How do magnets work?".into(),
            author_id: None,
            author_name: Some("stale".into()),
            status: QuestionStatus::Pending,
            created_at: Utc::now(),
        };
        assert_eq!(q.display_author(), "Anonymous");

        q.author_id = Some(Uuid::new_v4());
        assert_eq!(q.display_author(), "stale");
    }
}
