use std::str::FromStr;

use chrono::DateTime;
use chrono::NaiveTime;
use chrono::Utc;
use serde::Serialize;
use sqlx::FromRow;

#[derive(FromRow, Debug, Clone, Serialize)]
pub struct UserModel {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_active: bool,
}

#[derive(FromRow, Debug, Clone, Serialize)]
pub struct UserSettingsModel {
    pub id: i64,
    pub user_id: i64,
    pub delivery_time: String, // HH:MM
    pub delivery_frequency: String,
    pub timezone: String,
    pub openrouter_model: String,
    pub is_active: bool,
}

#[derive(FromRow, Debug, Clone, Serialize)]
pub struct SubscriptionModel {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub chat_title: String,
    pub is_active: bool,
    /// Highest message id covered by the most recent saved summary.
    pub last_processed_message_id: Option<i64>,
}

#[derive(FromRow, Debug, Clone, Serialize)]
pub struct SummaryModel {
    pub id: i64,
    pub subscription_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub from_message_id: Option<i64>,
    pub to_message_id: Option<i64>,
    pub model_used: Option<String>,
}

/// Flattened user + settings row used by the scheduler to derive jobs.
#[derive(FromRow, Debug, Clone)]
pub struct ScheduledUserRow {
    pub user_id: i64,
    pub telegram_id: i64,
    pub first_name: String,
    pub delivery_time: String,
    pub delivery_frequency: String,
    pub timezone: String,
}

/// How often a user receives digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFrequency {
    Daily,
    Weekly,
}

impl FromStr for DeliveryFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown delivery frequency `{other}`")),
        }
    }
}

impl std::fmt::Display for DeliveryFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

/// Parses a `HH:MM` delivery time.
pub fn parse_delivery_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}
