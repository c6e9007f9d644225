//! Client side of the question queue: keeps a dashboard or an overlay in
//! step with the server through the HTTP API and the real-time gateway.

pub mod api;
pub mod dashboard;
pub mod embed;
pub mod error;
pub mod presence;
pub mod subscription;

pub use api::{ChannelAuthorizer, HttpQueueApi, QueueApi};
pub use dashboard::{Dashboard, DashboardState};
pub use embed::EmbedState;
pub use error::ClientError;
pub use presence::PresenceTracker;
pub use subscription::ChannelSubscription;
