//! Summarization collaborator boundary and the model registry.

use async_trait::async_trait;

pub mod error;
pub mod openrouter;

pub use openrouter::OpenRouterSummarizer;

use crate::summarizer::error::SummarizeError;

/// Model used when a user has no valid model configured.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3-70b-instruct";

/// Models users may select for summarization.
pub const KNOWN_MODELS: &[&str] = &[
    "meta-llama/llama-3-70b-instruct",
    "meta-llama/llama-3-8b-instruct",
    "anthropic/claude-3-opus-20240229",
    "anthropic/claude-3-sonnet-20240229",
    "anthropic/claude-3-haiku-20240307",
    "google/gemini-1.5-pro-latest",
    "mistralai/mixtral-8x7b-instruct",
    "mistralai/mistral-7b-instruct",
    "openai/gpt-4o",
    "openai/gpt-3.5-turbo",
];

pub fn is_known_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
}

/// Returns `requested` if it names a known model, otherwise `default`.
pub fn validate_model<'a>(requested: &'a str, default: &'a str) -> &'a str {
    if is_known_model(requested) {
        requested
    } else {
        default
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Turns a formatted chat transcript into a summary using the given
    /// model.
    async fn summarize(&self, transcript: &str, model: &str) -> Result<String, SummarizeError>;
}
