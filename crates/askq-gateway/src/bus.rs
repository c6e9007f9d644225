use askq_types::events::QueueEvent;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("not a queue channel: {0}")]
    InvalidChannel(String),
}

/// Publish side of the real-time channels. Delivery is best-effort: a
/// successful return means the event was handed to the fan-out, not that any
/// subscriber received it.
pub trait EventBus: Send + Sync {
    fn publish(&self, channel: &str, event: QueueEvent) -> Result<(), PublishError>;
}
