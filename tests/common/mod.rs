use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use digest_bot::database::Database;
use digest_bot::database::model::SubscriptionModel;
use digest_bot::database::model::UserModel;
use digest_bot::delivery::DeliverySink;
use digest_bot::delivery::Notice;
use digest_bot::source::ChatHandle;
use digest_bot::source::ChatMessage;
use digest_bot::source::ChatSource;
use digest_bot::source::FetchWindow;
use digest_bot::source::error::SourceError;
use digest_bot::summarizer::Summarizer;
use digest_bot::summarizer::error::SummarizeError;
use uuid::Uuid;

pub async fn setup_db() -> (Arc<Database>, PathBuf) {
    let uuid = Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("digest-bot-test-{}.db", uuid));
    let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

    let db = Database::new(&db_url, db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");

    db.run_migrations().await.expect("Failed to run migrations");

    (Arc::new(db), db_path)
}

#[allow(dead_code)]
pub async fn teardown_db(db_path: PathBuf) {
    if db_path.exists() {
        let _ = std::fs::remove_file(db_path);
    }
}

#[allow(dead_code)]
pub async fn seed_user(db: &Database, telegram_id: i64) -> UserModel {
    db.user_table
        .get_or_create(telegram_id, "Test", None, None)
        .await
        .expect("Failed to seed user")
}

#[allow(dead_code)]
pub async fn seed_subscription(
    db: &Database,
    user_id: i64,
    chat_id: i64,
    title: &str,
) -> SubscriptionModel {
    db.subscription_table
        .upsert_active(user_id, chat_id, title)
        .await
        .expect("Failed to seed subscription")
}

/// A message `minutes_ago` minutes in the past.
#[allow(dead_code)]
pub fn message(id: i64, minutes_ago: i64, sender: &str, text: &str) -> ChatMessage {
    ChatMessage {
        id,
        date: Utc::now() - chrono::Duration::minutes(minutes_ago),
        sender: sender.to_string(),
        text: text.to_string(),
    }
}

// MOCK CHAT SOURCE

#[derive(Default)]
pub struct MockSourceState {
    pub chats: HashMap<i64, String>,
    pub messages: HashMap<i64, Vec<ChatMessage>>,
    pub unresolvable: HashSet<i64>,
    pub rate_limited: Option<Duration>,
    pub fetch_windows: Vec<(i64, FetchWindow)>,
    pub resolve_calls: u32,
    pub fetch_calls: u32,
}

#[derive(Clone, Default)]
pub struct MockChatSource {
    pub state: Arc<RwLock<MockSourceState>>,
}

#[allow(dead_code)]
impl MockChatSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chat(&self, chat_id: i64, title: &str) {
        self.state
            .write()
            .unwrap()
            .chats
            .insert(chat_id, title.to_string());
    }

    pub fn set_messages(&self, chat_id: i64, messages: Vec<ChatMessage>) {
        self.state
            .write()
            .unwrap()
            .messages
            .insert(chat_id, messages);
    }

    pub fn fail_resolution(&self, chat_id: i64) {
        self.state.write().unwrap().unresolvable.insert(chat_id);
    }

    pub fn set_rate_limited(&self, retry_after: Option<Duration>) {
        self.state.write().unwrap().rate_limited = retry_after;
    }

    pub fn fetch_calls(&self) -> u32 {
        self.state.read().unwrap().fetch_calls
    }

    pub fn last_window(&self) -> Option<(i64, FetchWindow)> {
        self.state.read().unwrap().fetch_windows.last().copied()
    }
}

#[async_trait]
impl ChatSource for MockChatSource {
    async fn resolve(&self, chat_id: i64) -> Result<ChatHandle, SourceError> {
        let mut state = self.state.write().unwrap();
        state.resolve_calls += 1;

        if let Some(retry_after) = state.rate_limited {
            return Err(SourceError::RateLimited { retry_after });
        }
        if state.unresolvable.contains(&chat_id) {
            return Err(SourceError::Resolution {
                chat_id,
                reason: "access revoked".to_string(),
            });
        }
        match state.chats.get(&chat_id) {
            Some(title) => Ok(ChatHandle {
                chat_id,
                title: title.clone(),
            }),
            None => Err(SourceError::Resolution {
                chat_id,
                reason: "unknown chat".to_string(),
            }),
        }
    }

    async fn fetch_messages(
        &self,
        handle: &ChatHandle,
        window: FetchWindow,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, SourceError> {
        let mut state = self.state.write().unwrap();
        state.fetch_calls += 1;
        state.fetch_windows.push((handle.chat_id, window));

        let messages = state
            .messages
            .get(&handle.chat_id)
            .cloned()
            .unwrap_or_default();

        let filtered: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| match window {
                FetchWindow::AfterId(id) => m.id > id,
                FetchWindow::SinceTime(ts) => m.date >= ts,
            })
            .take(limit as usize)
            .collect();

        Ok(filtered)
    }
}

// MOCK SUMMARIZER

pub struct MockSummarizerState {
    /// `Err(status)` makes the mock fail like a non-2xx API response.
    pub response: Result<String, u16>,
    pub delay: Option<Duration>,
    pub calls: u32,
    pub transcripts: Vec<String>,
    pub models: Vec<String>,
}

impl Default for MockSummarizerState {
    fn default() -> Self {
        Self {
            response: Ok("S".to_string()),
            delay: None,
            calls: 0,
            transcripts: Vec::new(),
            models: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockSummarizer {
    pub state: Arc<RwLock<MockSummarizerState>>,
}

#[allow(dead_code)]
impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, response: Result<String, u16>) {
        self.state.write().unwrap().response = response;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    pub fn calls(&self) -> u32 {
        self.state.read().unwrap().calls
    }

    pub fn last_transcript(&self) -> Option<String> {
        self.state.read().unwrap().transcripts.last().cloned()
    }

    pub fn last_model(&self) -> Option<String> {
        self.state.read().unwrap().models.last().cloned()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, transcript: &str, model: &str) -> Result<String, SummarizeError> {
        let (delay, response) = {
            let mut state = self.state.write().unwrap();
            state.calls += 1;
            state.transcripts.push(transcript.to_string());
            state.models.push(model.to_string());
            (state.delay, state.response.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        response.map_err(|status| SummarizeError::Api {
            status,
            body: "mock failure".to_string(),
        })
    }
}

// RECORDING DELIVERY SINK

#[derive(Default)]
pub struct RecordingSink {
    pub notices: Mutex<Vec<(i64, Notice)>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(i64, Notice)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, telegram_id: i64, notice: &Notice) -> anyhow::Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((telegram_id, notice.clone()));
        Ok(())
    }
}
