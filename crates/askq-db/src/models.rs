//! Row types, one per table.
//! Distinct from the askq-types API models; ids and timestamps stay as text.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub provider_account_id: String,
    pub username: String,
    pub image: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRow {
    pub id: String,
    pub owner_id: String,
    pub body: String,
    pub author_id: Option<String>,
    /// Joined from `users`; `None` for anonymous or unknown authors.
    pub author_name: Option<String>,
    pub status: String,
    pub created_at: String,
}

/// Outcome of an owner-scoped transition on a single question.
#[derive(Debug, PartialEq, Eq)]
pub enum Transition<T> {
    Applied(T),
    /// No active question with that id.
    Missing,
    /// The question belongs to another owner; nothing was changed.
    Foreign,
}
