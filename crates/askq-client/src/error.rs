#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("gateway connection failed: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("gateway protocol error: {0}")]
    Protocol(String),
}
