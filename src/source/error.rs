use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("Chat {chat_id} could not be resolved: {reason}")]
    Resolution { chat_id: i64, reason: String },

    #[error("Fetching from the chat source failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Chat platform asked to wait {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Unexpected response from the chat source: {message}")]
    UnexpectedResponse { message: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Fetch(Box::new(e))
    }
}
