pub mod auth;
pub mod chatbots;
pub mod error;
pub mod eventsub;
pub mod lifecycle;
pub mod middleware;
pub mod questions;
pub mod realtime;
pub mod routes;
pub mod settings;
pub mod users;

use std::sync::Arc;

use askq_db::Database;

/// Run blocking DB work off the async runtime.
pub(crate) async fn db_call<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}
