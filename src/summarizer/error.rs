#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SummarizeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Summarization API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed summarization response: {detail}")]
    MalformedResponse { detail: String },
}
