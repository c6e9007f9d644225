//! Broadcaster dashboard: a cache of the active queue kept honest by refetching.
//!
//! Mutations are applied to the cache before the server confirms them and
//! rolled back if it refuses. Queue events never patch the cache; they only
//! mark it stale so the next [`Dashboard::sync`] pulls the authoritative list.

use tracing::{debug, warn};
use uuid::Uuid;

use askq_types::events::QueueEvent;
use askq_types::models::{Question, QuestionStatus};

use crate::api::QueueApi;
use crate::error::ClientError;

/// Cache state saved before an optimistic change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    questions: Vec<Question>,
    pinned: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    questions: Vec<Question>,
    pinned: Option<Uuid>,
    stale: bool,
    error: Option<String>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self { stale: true, ..Default::default() }
    }

    /// Replace the cache with a fresh server listing.
    pub fn replace(&mut self, questions: Vec<Question>) {
        self.pinned = questions
            .iter()
            .find(|q| q.status == QuestionStatus::Pinned)
            .map(|q| q.id);
        self.questions = questions;
        self.stale = false;
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn pinned(&self) -> Option<&Question> {
        let id = self.pinned?;
        self.questions.iter().find(|q| q.id == id)
    }

    /// Queue below the pinned question, oldest first.
    pub fn others(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| Some(q.id) != self.pinned)
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn apply_event(&mut self, event: &QueueEvent) {
        debug!("dashboard got {}, refetch pending", event.name());
        self.stale = true;
    }

    /// Last mutation failure, cleared when read.
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { questions: self.questions.clone(), pinned: self.pinned }
    }

    pub fn rollback(&mut self, snapshot: Snapshot, error: &ClientError) {
        warn!("dashboard mutation failed, rolling back: {}", error);
        self.questions = snapshot.questions;
        self.pinned = snapshot.pinned;
        self.error = Some(error.to_string());
    }

    pub fn optimistic_archive(&mut self, question_id: Uuid) {
        self.questions.retain(|q| q.id != question_id);
        if self.pinned == Some(question_id) {
            self.pinned = None;
        }
    }

    /// Drop everything that is not pinned.
    pub fn optimistic_archive_pending(&mut self) {
        let pinned = self.pinned;
        self.questions.retain(|q| Some(q.id) == pinned);
    }

    pub fn optimistic_pin(&mut self, question_id: Uuid) {
        for q in &mut self.questions {
            q.status = if q.id == question_id {
                QuestionStatus::Pinned
            } else {
                QuestionStatus::Pending
            };
        }
        self.pinned = Some(question_id);
    }

    pub fn optimistic_unpin(&mut self) {
        for q in &mut self.questions {
            q.status = QuestionStatus::Pending;
        }
        self.pinned = None;
    }
}

/// Drives a [`DashboardState`] through a [`QueueApi`].
pub struct Dashboard<A> {
    api: A,
    state: DashboardState,
}

impl<A: QueueApi> Dashboard<A> {
    pub fn new(api: A) -> Self {
        Self { api, state: DashboardState::new() }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DashboardState {
        &mut self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let questions = self.api.list_active().await?;
        self.state.replace(questions);
        Ok(())
    }

    /// Refetch if an event (or a failed refetch) left the cache stale.
    pub async fn sync(&mut self) -> Result<(), ClientError> {
        if self.state.is_stale() {
            self.refresh().await?;
        }
        Ok(())
    }

    /// React to a queue event from the owner's channel.
    pub async fn handle_event(&mut self, event: &QueueEvent) {
        self.state.apply_event(event);
        if let Err(e) = self.sync().await {
            warn!("dashboard refetch failed: {}", e);
        }
    }

    pub async fn pin(&mut self, question_id: Uuid) -> Result<(), ClientError> {
        let snapshot = self.state.snapshot();
        self.state.optimistic_pin(question_id);
        if let Err(e) = self.api.pin(question_id).await {
            self.state.rollback(snapshot, &e);
            return Err(e);
        }
        Ok(())
    }

    pub async fn unpin(&mut self) -> Result<(), ClientError> {
        let snapshot = self.state.snapshot();
        self.state.optimistic_unpin();
        if let Err(e) = self.api.unpin().await {
            self.state.rollback(snapshot, &e);
            return Err(e);
        }
        Ok(())
    }

    pub async fn archive(&mut self, question_id: Uuid) -> Result<(), ClientError> {
        let snapshot = self.state.snapshot();
        self.state.optimistic_archive(question_id);
        if let Err(e) = self.api.archive(question_id).await {
            self.state.rollback(snapshot, &e);
            return Err(e);
        }
        Ok(())
    }

    pub async fn archive_all(&mut self) -> Result<(), ClientError> {
        let snapshot = self.state.snapshot();
        self.state.optimistic_archive_pending();
        if let Err(e) = self.api.archive_all().await {
            self.state.rollback(snapshot, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Archive what is on screen and pin the oldest waiting question.
    pub async fn next_question(&mut self) -> Result<(), ClientError> {
        let current = self.state.pinned;
        let next = self.state.others().next().map(|q| q.id);

        if let Some(current) = current {
            self.archive(current).await?;
        }
        if let Some(next) = next {
            self.pin(next).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    /// In-memory stand-in for the server.
    #[derive(Default)]
    struct FakeApi {
        questions: Mutex<Vec<Question>>,
        fail: Mutex<bool>,
    }

    impl FakeApi {
        fn with(bodies: &[&str]) -> Self {
            let owner = Uuid::new_v4();
            let questions = bodies
                .iter()
                .map(|body| Question {
                    id: Uuid::new_v4(),
                    owner_user_id: owner,
                    body: body.to_string(),
                    author_id: None,
                    author_name: None,
                    status: QuestionStatus::Pending,
                    created_at: Utc::now(),
                })
                .collect();
            Self { questions: Mutex::new(questions), ..Default::default() }
        }

        fn failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn check(&self) -> Result<(), ClientError> {
            if *self.fail.lock().unwrap() {
                return Err(ClientError::Status { status: 500, message: "Internal server error".into() });
            }
            Ok(())
        }

        fn status_of(&self, id: Uuid) -> Option<QuestionStatus> {
            self.questions.lock().unwrap().iter().find(|q| q.id == id).map(|q| q.status)
        }
    }

    impl QueueApi for FakeApi {
        async fn list_active(&self) -> Result<Vec<Question>, ClientError> {
            self.check()?;
            Ok(self.questions.lock().unwrap().clone())
        }

        async fn pin(&self, question_id: Uuid) -> Result<Question, ClientError> {
            self.check()?;
            let mut questions = self.questions.lock().unwrap();
            if !questions.iter().any(|q| q.id == question_id) {
                return Err(ClientError::Status { status: 404, message: "Question not found".into() });
            }
            for q in questions.iter_mut() {
                q.status = if q.id == question_id { QuestionStatus::Pinned } else { QuestionStatus::Pending };
            }
            Ok(questions.iter().find(|q| q.id == question_id).cloned().unwrap())
        }

        async fn unpin(&self) -> Result<(), ClientError> {
            self.check()?;
            for q in self.questions.lock().unwrap().iter_mut() {
                q.status = QuestionStatus::Pending;
            }
            Ok(())
        }

        async fn archive(&self, question_id: Uuid) -> Result<(), ClientError> {
            self.check()?;
            self.questions.lock().unwrap().retain(|q| q.id != question_id);
            Ok(())
        }

        async fn archive_all(&self) -> Result<(), ClientError> {
            self.check()?;
            self.questions.lock().unwrap().retain(|q| q.status == QuestionStatus::Pinned);
            Ok(())
        }
    }

    async fn dashboard(bodies: &[&str]) -> Dashboard<FakeApi> {
        let mut dashboard = Dashboard::new(FakeApi::with(bodies));
        dashboard.sync().await.unwrap();
        dashboard
    }

    fn bodies(state: &DashboardState) -> Vec<&str> {
        state.others().map(|q| q.body.as_str()).collect()
    }

    #[tokio::test]
    async fn starts_stale_and_loads_on_sync() {
        let mut dashboard = Dashboard::new(FakeApi::with(&["a", "b"]));
        assert!(dashboard.state().is_stale());
        dashboard.sync().await.unwrap();
        assert!(!dashboard.state().is_stale());
        assert_eq!(bodies(dashboard.state()), vec!["a", "b"]);
        assert!(dashboard.state().pinned().is_none());
    }

    #[tokio::test]
    async fn events_trigger_a_refetch() {
        let mut dashboard = dashboard(&["a"]).await;
        dashboard.api().questions.lock().unwrap().push(Question {
            body: "late arrival".into(),
            id: Uuid::new_v4(),
            ..dashboard.state().questions()[0].clone()
        });

        dashboard.handle_event(&QueueEvent::NewQuestion {}).await;
        assert_eq!(bodies(dashboard.state()), vec!["a", "late arrival"]);
    }

    #[tokio::test]
    async fn failed_refetch_leaves_the_cache_stale() {
        let mut dashboard = dashboard(&["a"]).await;
        dashboard.api().failing(true);
        dashboard.handle_event(&QueueEvent::NewQuestion {}).await;
        assert!(dashboard.state().is_stale());

        dashboard.api().failing(false);
        dashboard.sync().await.unwrap();
        assert!(!dashboard.state().is_stale());
    }

    #[tokio::test]
    async fn pin_moves_the_marker_and_survives_refetch() {
        let mut dashboard = dashboard(&["a", "b"]).await;
        let b = dashboard.state().questions()[1].id;

        dashboard.pin(b).await.unwrap();
        assert_eq!(dashboard.state().pinned().unwrap().body, "b");
        assert_eq!(bodies(dashboard.state()), vec!["a"]);

        dashboard.handle_event(&QueueEvent::QuestionPinned { question: "b".into(), author: None }).await;
        assert_eq!(dashboard.state().pinned().unwrap().id, b);
    }

    #[tokio::test]
    async fn failed_archive_rolls_back_and_reports() {
        let mut dashboard = dashboard(&["a", "b"]).await;
        let a = dashboard.state().questions()[0].id;
        dashboard.api().failing(true);

        assert!(dashboard.archive(a).await.is_err());
        assert_eq!(bodies(dashboard.state()), vec!["a", "b"]);
        assert_eq!(
            dashboard.state_mut().take_error().as_deref(),
            Some("server returned 500: Internal server error")
        );
        assert_eq!(dashboard.state_mut().take_error(), None);
    }

    #[tokio::test]
    async fn failed_pin_restores_the_previous_pin() {
        let mut dashboard = dashboard(&["a", "b"]).await;
        let a = dashboard.state().questions()[0].id;
        let b = dashboard.state().questions()[1].id;
        dashboard.pin(a).await.unwrap();

        dashboard.api().failing(true);
        assert!(dashboard.pin(b).await.is_err());
        assert_eq!(dashboard.state().pinned().unwrap().id, a);
        assert!(dashboard.unpin().await.is_err());
        assert_eq!(dashboard.state().pinned().unwrap().id, a);
    }

    #[tokio::test]
    async fn next_question_archives_current_and_pins_oldest() {
        let mut dashboard = dashboard(&["a", "b", "c"]).await;
        let ids: Vec<Uuid> = dashboard.state().questions().iter().map(|q| q.id).collect();

        // Nothing pinned yet: just pin the oldest.
        dashboard.next_question().await.unwrap();
        assert_eq!(dashboard.state().pinned().unwrap().id, ids[0]);

        dashboard.next_question().await.unwrap();
        assert_eq!(dashboard.state().pinned().unwrap().id, ids[1]);
        assert_eq!(dashboard.api().status_of(ids[0]), None);
        assert_eq!(dashboard.api().status_of(ids[1]), Some(QuestionStatus::Pinned));
        assert_eq!(bodies(dashboard.state()), vec!["c"]);
    }

    #[tokio::test]
    async fn archive_all_keeps_the_pinned_question() {
        let mut dashboard = dashboard(&["a", "b", "c"]).await;
        let b = dashboard.state().questions()[1].id;
        dashboard.pin(b).await.unwrap();

        dashboard.archive_all().await.unwrap();
        assert!(bodies(dashboard.state()).is_empty());
        assert_eq!(dashboard.state().pinned().unwrap().id, b);

        dashboard.handle_event(&QueueEvent::NewQuestion {}).await;
        assert_eq!(dashboard.state().questions().len(), 1);
    }
}
