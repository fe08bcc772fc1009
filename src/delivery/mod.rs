//! Delivery sink boundary: per-subscription outcome notices pushed back to
//! the user's delivery channel.

use async_trait::async_trait;

pub mod gateway_sink;
pub mod log_sink;

pub use gateway_sink::GatewaySink;
pub use log_sink::LogSink;

/// A user-facing notification about one digest outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A summary was generated for one subscription.
    Summary { chat_title: String, text: String },
    /// The subscription had no new messages this cycle.
    NoNewMessages { chat_title: String },
    /// Summarizing one subscription failed.
    Failure { chat_title: String, reason: String },
    /// The user has no active subscriptions.
    NothingToDo,
    /// The user's schedule settings are invalid and no digest is scheduled.
    BadSchedule { reason: String },
}

impl Notice {
    /// Short human-readable rendition of the notice.
    pub fn render(&self) -> String {
        match self {
            Notice::Summary { chat_title, text } => {
                format!("\u{1F4DD} Summary of {chat_title}:\n\n{text}")
            }
            Notice::NoNewMessages { chat_title } => {
                format!("No new messages in {chat_title}.")
            }
            Notice::Failure { chat_title, reason } => {
                format!("\u{274C} Could not summarize {chat_title}: {reason}")
            }
            Notice::NothingToDo => "You have no active chat subscriptions.".to_string(),
            Notice::BadSchedule { reason } => {
                format!("\u{26A0} Your digest schedule is invalid and was not scheduled: {reason}")
            }
        }
    }
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Delivers one notice to the user identified by their platform id.
    async fn deliver(&self, telegram_id: i64, notice: &Notice) -> anyhow::Result<()>;
}
