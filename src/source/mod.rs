//! Chat source collaborator boundary.
//!
//! Everything platform-specific (sessions, identities, transport) lives
//! behind [`ChatSource`]; the pipeline only sees resolved handles and plain
//! messages.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

pub mod error;
pub mod gateway_source;

pub use gateway_source::GatewaySource;

use crate::source::error::SourceError;

/// A chat target resolved by the source and usable for fetching.
#[derive(Clone, Debug)]
pub struct ChatHandle {
    pub chat_id: i64,
    pub title: String,
}

/// One raw message from a chat.
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub sender: String,
    pub text: String,
}

/// Message range selector for one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchWindow {
    /// Fresh subscription: everything newer than this instant.
    SinceTime(DateTime<Utc>),
    /// Established subscription: everything past the watermark.
    AfterId(i64),
}

/// Origin of a forwarded message, classified once at the source boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardOrigin {
    PrivateUser,
    Group { chat_id: i64, title: String },
    Channel { chat_id: i64, title: String },
    Unresolvable,
}

#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Resolves a chat identity into a fetchable handle.
    async fn resolve(&self, chat_id: i64) -> Result<ChatHandle, SourceError>;

    /// Fetches up to `limit` messages in the given window. Order is not
    /// guaranteed by the source.
    async fn fetch_messages(
        &self,
        handle: &ChatHandle,
        window: FetchWindow,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, SourceError>;
}
