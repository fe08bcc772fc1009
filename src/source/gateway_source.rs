//! Chat gateway client.
//!
//! Talks to the chat-gateway sidecar over HTTP. The gateway owns the actual
//! platform session; this client only resolves chats, pulls message windows
//! and classifies forward origins.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::source::ChatHandle;
use crate::source::ChatMessage;
use crate::source::ChatSource;
use crate::source::FetchWindow;
use crate::source::ForwardOrigin;
use crate::source::error::SourceError;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Deserialize)]
struct ChatDto {
    id: i64,
    title: String,
}

#[derive(Deserialize)]
struct MessageDto {
    id: i64,
    date: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesDto {
    messages: Vec<MessageDto>,
}

pub struct GatewaySource {
    client: reqwest::Client,
    base_url: String,
}

impl GatewaySource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Maps the gateway's chat `kind` string to a forward origin, once, at
    /// this boundary.
    pub fn classify_origin(kind: &str, chat_id: i64, title: &str) -> ForwardOrigin {
        match kind {
            "group" | "supergroup" => ForwardOrigin::Group {
                chat_id,
                title: title.to_string(),
            },
            "channel" => ForwardOrigin::Channel {
                chat_id,
                title: title.to_string(),
            },
            "private" => ForwardOrigin::PrivateUser,
            _ => ForwardOrigin::Unresolvable,
        }
    }

    fn retry_after(resp: &reqwest::Response) -> Duration {
        let secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        Duration::from_secs(secs)
    }
}

#[async_trait]
impl ChatSource for GatewaySource {
    async fn resolve(&self, chat_id: i64) -> Result<ChatHandle, SourceError> {
        let url = format!("{}/chats/{}", self.base_url, chat_id);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                retry_after: Self::retry_after(&resp),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Resolution {
                chat_id,
                reason: format!("gateway returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedResponse {
                message: format!("resolve returned {status}"),
            });
        }

        let chat = resp.json::<ChatDto>().await?;
        Ok(ChatHandle {
            chat_id: chat.id,
            title: chat.title,
        })
    }

    async fn fetch_messages(
        &self,
        handle: &ChatHandle,
        window: FetchWindow,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, SourceError> {
        let url = format!("{}/chats/{}/messages", self.base_url, handle.chat_id);
        let mut request = self.client.get(&url).query(&[("limit", limit.to_string())]);
        request = match window {
            FetchWindow::AfterId(id) => request.query(&[("after_id", id.to_string())]),
            FetchWindow::SinceTime(ts) => request.query(&[("since", ts.to_rfc3339())]),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited {
                retry_after: Self::retry_after(&resp),
            });
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedResponse {
                message: format!("fetch returned {status}"),
            });
        }

        let body = resp.json::<MessagesDto>().await?;
        debug!(
            "Fetched {} messages from chat {}",
            body.messages.len(),
            handle.chat_id
        );

        Ok(body
            .messages
            .into_iter()
            .map(|m| ChatMessage {
                id: m.id,
                date: m.date,
                sender: m.sender,
                text: m.text,
            })
            .collect())
    }
}
