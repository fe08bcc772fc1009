//! Subscription and settings management.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use chrono_tz::Tz;
use log::info;

use crate::database::Database;
use crate::database::model::DeliveryFrequency;
use crate::database::model::SubscriptionModel;
use crate::database::model::UserModel;
use crate::database::model::UserSettingsModel;
use crate::database::model::parse_delivery_time;
use crate::database::table::UserSettingsUpdate;
use crate::service::error::ServiceError;
use crate::source::ChatSource;
use crate::source::ForwardOrigin;
use crate::summarizer;

/// How long an unsubscribe selection stays valid.
const PENDING_TTL: Duration = Duration::from_secs(300);

struct PendingUnsubscribe {
    subscriptions: Vec<SubscriptionModel>,
    created_at: Instant,
}

#[derive(Debug)]
pub enum SubscribeResult {
    Subscribed { subscription: SubscriptionModel },
    NotAllowed { reason: &'static str },
}

/// Settings after an update, plus whether the scheduler must re-derive the
/// user's job.
#[derive(Debug)]
pub struct SettingsChange {
    pub settings: UserSettingsModel,
    pub schedule_affected: bool,
}

/// Service for managing users, their subscriptions and their settings.
pub struct SubscriptionService {
    db: Arc<Database>,
    source: Arc<dyn ChatSource>,
    /// Keyed pending-confirmation store for the two-step unsubscribe flow.
    pending: Mutex<HashMap<i64, PendingUnsubscribe>>,
    pending_ttl: Duration,
}

impl SubscriptionService {
    pub fn new(db: Arc<Database>, source: Arc<dyn ChatSource>) -> Self {
        Self::with_pending_ttl(db, source, PENDING_TTL)
    }

    pub fn with_pending_ttl(
        db: Arc<Database>,
        source: Arc<dyn ChatSource>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            db,
            source,
            pending: Mutex::new(HashMap::new()),
            pending_ttl,
        }
    }

    /// Fetches or creates the user for an incoming interaction. Default
    /// settings are created together with a new user.
    pub async fn register_user(
        &self,
        telegram_id: i64,
        first_name: &str,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<UserModel, ServiceError> {
        let user = self
            .db
            .user_table
            .get_or_create(telegram_id, first_name, last_name, username)
            .await?;
        Ok(user)
    }

    /// Subscribes the user to the chat a message was forwarded from.
    ///
    /// Only group and channel origins are subscribable. The chat source must
    /// be able to resolve the chat before anything is recorded.
    pub async fn subscribe_from_forward(
        &self,
        user: &UserModel,
        origin: ForwardOrigin,
    ) -> Result<SubscribeResult, ServiceError> {
        let (chat_id, forwarded_title) = match origin {
            ForwardOrigin::Group { chat_id, title } | ForwardOrigin::Channel { chat_id, title } => {
                (chat_id, title)
            }
            ForwardOrigin::PrivateUser => {
                return Ok(SubscribeResult::NotAllowed {
                    reason: "the message was forwarded from a private conversation",
                });
            }
            ForwardOrigin::Unresolvable => {
                return Ok(SubscribeResult::NotAllowed {
                    reason: "the origin of the forwarded message could not be determined",
                });
            }
        };

        let handle = self.source.resolve(chat_id).await?;
        let title = if handle.title.is_empty() {
            forwarded_title
        } else {
            handle.title
        };

        let subscription = self
            .db
            .subscription_table
            .upsert_active(user.id, chat_id, &title)
            .await?;

        info!(
            "User {} subscribed to chat {} ({title})",
            user.telegram_id, chat_id
        );
        Ok(SubscribeResult::Subscribed { subscription })
    }

    pub async fn list_subscriptions(
        &self,
        user: &UserModel,
    ) -> Result<Vec<SubscriptionModel>, ServiceError> {
        Ok(self
            .db
            .subscription_table
            .select_active_by_user_id(user.id)
            .await?)
    }

    /// Starts the two-step unsubscribe flow and returns the numbered choices.
    /// An empty list means there is nothing to unsubscribe from.
    pub async fn begin_unsubscribe(
        &self,
        user: &UserModel,
    ) -> Result<Vec<(usize, String)>, ServiceError> {
        let subs = self
            .db
            .subscription_table
            .select_active_by_user_id(user.id)
            .await?;
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let listing = subs
            .iter()
            .enumerate()
            .map(|(i, s)| (i + 1, s.chat_title.clone()))
            .collect();

        let mut pending = self.pending.lock().unwrap();
        pending.retain(|_, p| p.created_at.elapsed() <= self.pending_ttl);
        pending.insert(
            user.id,
            PendingUnsubscribe {
                subscriptions: subs,
                created_at: Instant::now(),
            },
        );

        Ok(listing)
    }

    /// Completes the unsubscribe flow with the user's numeric choice.
    pub async fn confirm_unsubscribe(
        &self,
        user: &UserModel,
        choice: usize,
    ) -> Result<SubscriptionModel, ServiceError> {
        let selected = {
            let mut pending = self.pending.lock().unwrap();
            let entry = pending.remove(&user.id).ok_or(ServiceError::PendingExpired)?;
            if entry.created_at.elapsed() > self.pending_ttl {
                return Err(ServiceError::PendingExpired);
            }

            let max = entry.subscriptions.len();
            if choice == 0 || choice > max {
                // Keep the pending entry so the user can pick again.
                pending.insert(user.id, entry);
                return Err(ServiceError::InvalidChoice { choice, max });
            }
            entry.subscriptions[choice - 1].clone()
        };

        let removed = self
            .db
            .subscription_table
            .deactivate(selected.user_id, selected.chat_id)
            .await?;
        if !removed {
            return Err(ServiceError::NotFound {
                what: format!("Active subscription to {}", selected.chat_title),
            });
        }

        info!(
            "User {} unsubscribed from chat {} ({})",
            user.telegram_id, selected.chat_id, selected.chat_title
        );
        Ok(selected)
    }

    /// Validates and applies a partial settings update.
    pub async fn update_settings(
        &self,
        user: &UserModel,
        update: UserSettingsUpdate,
    ) -> Result<SettingsChange, ServiceError> {
        if let Some(time) = &update.delivery_time
            && parse_delivery_time(time).is_none()
        {
            return Err(ServiceError::Configuration {
                msg: format!("`{time}` is not a valid HH:MM delivery time"),
            });
        }
        if let Some(frequency) = &update.delivery_frequency
            && frequency.parse::<DeliveryFrequency>().is_err()
        {
            return Err(ServiceError::Configuration {
                msg: format!("`{frequency}` is not a valid delivery frequency (daily, weekly)"),
            });
        }
        if let Some(timezone) = &update.timezone
            && timezone.parse::<Tz>().is_err()
        {
            return Err(ServiceError::Configuration {
                msg: format!("`{timezone}` is not a known timezone"),
            });
        }
        if let Some(model) = &update.openrouter_model
            && !summarizer::is_known_model(model)
        {
            return Err(ServiceError::Configuration {
                msg: format!("`{model}` is not an available model"),
            });
        }

        let schedule_affected = update.delivery_time.is_some()
            || update.delivery_frequency.is_some()
            || update.timezone.is_some()
            || update.is_active.is_some();

        let settings = self
            .db
            .user_settings_table
            .update_fields(user.id, &update)
            .await?;

        Ok(SettingsChange {
            settings,
            schedule_affected,
        })
    }
}
