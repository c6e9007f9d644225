use tracing::warn;

use askq_types::api::PinnedQuestionResponse;
use askq_types::events::QueueEvent;

use crate::error::ClientError;

/// What the stream overlay shows. It has no authenticated query path, so after
/// the initial lookup it only follows pin/unpin events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedState {
    pinned: Option<PinnedQuestionResponse>,
}

impl EmbedState {
    /// Start from the public pinned-question lookup. A failed lookup shows nothing.
    pub fn seeded(lookup: Result<Option<PinnedQuestionResponse>, ClientError>) -> Self {
        match lookup {
            Ok(pinned) => Self { pinned },
            Err(e) => {
                warn!("pinned lookup failed, overlay starts empty: {}", e);
                Self::default()
            }
        }
    }

    pub fn apply(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::QuestionPinned { question, author } => {
                self.pinned = Some(PinnedQuestionResponse {
                    question: question.clone(),
                    author: author.clone(),
                });
            }
            QueueEvent::QuestionUnpinned {} => self.pinned = None,
            QueueEvent::NewQuestion {} => {}
        }
    }

    /// Body currently on screen.
    pub fn question(&self) -> Option<&str> {
        self.pinned.as_ref().map(|p| p.question.as_str())
    }

    pub fn author(&self) -> &str {
        self.pinned
            .as_ref()
            .and_then(|p| p.author.as_deref())
            .unwrap_or("Anonymous")
    }
}
