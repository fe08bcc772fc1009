//! Fetch-and-summarize pipeline and the per-user subscription iterator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::database::Database;
use crate::database::error::DatabaseError;
use crate::database::model::SubscriptionModel;
use crate::database::model::SummaryModel;
use crate::database::model::UserModel;
use crate::source::ChatMessage;
use crate::source::ChatSource;
use crate::source::FetchWindow;
use crate::source::error::SourceError;
use crate::summarizer;
use crate::summarizer::Summarizer;
use crate::summarizer::error::SummarizeError;

/// How far back the first run of a fresh subscription looks.
const FRESH_WINDOW_HOURS: i64 = 24;

/// Content recorded when the window has messages but none carry text. A
/// summary row must still be written, because the watermark may only move
/// together with a saved summary.
const EMPTY_WINDOW_SUMMARY: &str = "No text messages in this period.";

#[derive(Debug)]
pub enum PipelineOutcome {
    /// A summary was generated and persisted; the watermark advanced.
    Summarized(SummaryModel),
    /// The window was empty; nothing was persisted or advanced.
    NoNewMessages,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("Chat {chat_id} could not be resolved: {reason}")]
    Resolution { chat_id: i64, reason: String },

    #[error("Fetching messages failed: {0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Summarization failed: {0}")]
    Summarization(#[from] SummarizeError),

    #[error("Chat platform asked to wait {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("DatabaseError: {0}")]
    Database(#[from] DatabaseError),
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Resolution { chat_id, reason } => {
                PipelineError::Resolution { chat_id, reason }
            }
            SourceError::RateLimited { retry_after } => PipelineError::RateLimited { retry_after },
            SourceError::Fetch(inner) => PipelineError::Fetch(inner),
            other => PipelineError::Fetch(Box::new(other)),
        }
    }
}

/// Result of one pipeline run for one subscription.
#[derive(Debug)]
pub struct SubscriptionOutcome {
    pub subscription_id: i64,
    pub chat_title: String,
    pub result: Result<PipelineOutcome, PipelineError>,
}

/// Everything that happened during one scheduled run for one user.
#[derive(Debug, Default)]
pub struct UserRunReport {
    pub outcomes: Vec<SubscriptionOutcome>,
    /// Set when the chat platform rate limited the run. Remaining
    /// subscriptions were deferred to the next cycle.
    pub rate_limited: Option<Duration>,
}

impl UserRunReport {
    /// True when the user had no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Service that turns message windows into persisted summaries.
pub struct SummaryService {
    db: Arc<Database>,
    source: Arc<dyn ChatSource>,
    summarizer: Arc<dyn Summarizer>,
    default_model: String,
    fetch_limit: u32,
}

impl SummaryService {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ChatSource>,
        summarizer: Arc<dyn Summarizer>,
        default_model: String,
        fetch_limit: u32,
    ) -> Self {
        Self {
            db,
            source,
            summarizer,
            default_model,
            fetch_limit,
        }
    }

    /// Runs the pipeline once for a single subscription.
    ///
    /// The watermark is advanced only after a summary row for the window has
    /// been saved. If the watermark update itself fails, the summary row
    /// stays and the next run refetches an already-summarized range:
    /// delivery is at-least-once across store failures.
    pub async fn run_once(
        &self,
        sub: &SubscriptionModel,
        tz: Tz,
        model: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        let handle = self.source.resolve(sub.chat_id).await?;

        let window = match sub.last_processed_message_id {
            Some(watermark) => FetchWindow::AfterId(watermark),
            None => FetchWindow::SinceTime(Utc::now() - chrono::Duration::hours(FRESH_WINDOW_HOURS)),
        };

        let mut messages = self
            .source
            .fetch_messages(&handle, window, self.fetch_limit)
            .await?;

        if messages.is_empty() {
            return Ok(PipelineOutcome::NoNewMessages);
        }

        // The source does not guarantee ordering; id order is canonical.
        messages.sort_by_key(|m| m.id);

        let from_id = messages.first().map(|m| m.id);
        let to_id = messages.last().map(|m| m.id);

        let transcript = format_transcript(&messages, &tz);
        let content = if transcript.is_empty() {
            EMPTY_WINDOW_SUMMARY.to_string()
        } else {
            self.summarizer.summarize(&transcript, model).await?
        };

        let summary = SummaryModel {
            id: 0,
            subscription_id: sub.id,
            content,
            created_at: Utc::now(),
            from_message_id: from_id,
            to_message_id: to_id,
            model_used: Some(model.to_string()),
        };
        let summary_id = self.db.summary_table.insert(&summary).await?;

        let new_watermark = to_id.unwrap_or_default();
        let advanced = self
            .db
            .subscription_table
            .advance_watermark(sub.id, new_watermark)
            .await?;
        if !advanced {
            warn!(
                "Watermark of subscription {} did not advance past {new_watermark}; \
                 the next run will refetch an already-summarized range",
                sub.id
            );
        }

        Ok(PipelineOutcome::Summarized(SummaryModel {
            id: summary_id,
            ..summary
        }))
    }

    /// Runs the pipeline for every active subscription of a user.
    ///
    /// Per-subscription failures are collected as outcomes and never abort
    /// the remaining subscriptions. The only error returned is a store
    /// failure before any pipeline work started.
    pub async fn run_for_user(&self, user: &UserModel) -> Result<UserRunReport, DatabaseError> {
        let subs = self
            .db
            .subscription_table
            .select_active_by_user_id(user.id)
            .await?;

        if subs.is_empty() {
            info!("User {} has no active subscriptions", user.telegram_id);
            return Ok(UserRunReport::default());
        }

        let settings = self.db.user_settings_table.select_by_user_id(user.id).await?;
        let (model, tz) = match &settings {
            Some(s) => {
                let tz = s.timezone.parse::<Tz>().unwrap_or_else(|_| {
                    warn!(
                        "User {} has invalid timezone `{}`, formatting in UTC",
                        user.telegram_id, s.timezone
                    );
                    Tz::UTC
                });
                (
                    summarizer::validate_model(&s.openrouter_model, &self.default_model)
                        .to_string(),
                    tz,
                )
            }
            None => (self.default_model.clone(), Tz::UTC),
        };

        let mut outcomes = Vec::new();
        let mut rate_limited = None;

        for sub in subs {
            let result = self.run_once(&sub, tz, &model).await;

            match &result {
                Ok(PipelineOutcome::Summarized(summary)) => {
                    info!(
                        "Summarized subscription {} ({}) over messages {:?}..={:?}",
                        sub.id, sub.chat_title, summary.from_message_id, summary.to_message_id
                    );
                }
                Ok(PipelineOutcome::NoNewMessages) => {
                    debug!("No new messages for subscription {} ({})", sub.id, sub.chat_title);
                }
                Err(PipelineError::RateLimited { retry_after }) => {
                    warn!(
                        "Rate limited on subscription {} ({}), deferring the rest of this run",
                        sub.id, sub.chat_title
                    );
                    rate_limited = Some(*retry_after);
                }
                Err(e) => {
                    error!(
                        "Summarizing subscription {} ({}) failed: {e}",
                        sub.id, sub.chat_title
                    );
                }
            }

            let deferred = matches!(result, Err(PipelineError::RateLimited { .. }));
            outcomes.push(SubscriptionOutcome {
                subscription_id: sub.id,
                chat_title: sub.chat_title.clone(),
                result,
            });
            if deferred {
                break;
            }
        }

        Ok(UserRunReport {
            outcomes,
            rate_limited,
        })
    }
}

/// Formats messages as `[DD.MM HH:MM sender]: text` lines in the owner's
/// timezone. Messages without text are part of the window but not of the
/// transcript.
fn format_transcript(messages: &[ChatMessage], tz: &Tz) -> String {
    let mut lines = Vec::new();
    for msg in messages {
        let text = msg.text.trim();
        if text.is_empty() {
            continue;
        }
        let local = msg.date.with_timezone(tz);
        lines.push(format!(
            "[{} {}]: {}",
            local.format("%d.%m %H:%M"),
            msg.sender,
            text
        ));
    }
    lines.join("\n")
}
