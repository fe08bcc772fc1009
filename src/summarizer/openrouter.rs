//! OpenRouter chat-completion client.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde::Serialize;

use crate::summarizer::Summarizer;
use crate::summarizer::error::SummarizeError;

const SYSTEM_PROMPT: &str =
    "You are an assistant that writes short, informative summaries of group chat conversations.";

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct OpenRouterSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterSummarizer {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn build_prompt(transcript: &str) -> String {
        format!(
            "Please write a concise summary of the following chat messages. \
             Structure it into these sections:\n\
             1. Main topics: the 3-5 subjects that were discussed most\n\
             2. Key discussions: 2-3 important threads and their main points\n\
             3. Announcements: any important announcements, if there were any\n\n\
             Messages:\n{transcript}\n\n\
             Keep the summary compact but useful, highlighting what matters most."
        )
    }
}

#[async_trait]
impl Summarizer for OpenRouterSummarizer {
    async fn summarize(&self, transcript: &str, model: &str) -> Result<String, SummarizeError> {
        debug!("Requesting summary from model {model}");

        let prompt = Self::build_prompt(transcript);
        let request = ChatRequest {
            model,
            messages: vec![
                RequestMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                RequestMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = resp
            .json::<ChatResponse>()
            .await
            .map_err(|e| SummarizeError::MalformedResponse {
                detail: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(SummarizeError::MalformedResponse {
                detail: "response contained no choices".to_string(),
            })?;

        Ok(content)
    }
}
