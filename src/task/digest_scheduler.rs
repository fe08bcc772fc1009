//! Background scheduler for per-user digest deliveries.
//!
//! Keeps one recurring job per active user, derived from that user's
//! delivery time, frequency and timezone. A coarse due-check loop fires jobs
//! and hands each run off to its own task, so one user's slow summarization
//! batch never blocks another user's trigger.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::Datelike;
use chrono::LocalResult;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Utc;
use chrono::Weekday;
use chrono_tz::Tz;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::time::sleep;

use crate::database::Database;
use crate::database::error::DatabaseError;
use crate::database::model::DeliveryFrequency;
use crate::database::model::ScheduledUserRow;
use crate::database::model::UserModel;
use crate::database::model::parse_delivery_time;
use crate::delivery::DeliverySink;
use crate::delivery::Notice;
use crate::service::summary_service::PipelineOutcome;
use crate::service::summary_service::SummaryService;
use crate::service::summary_service::UserRunReport;

/// Upper bound on the date probing done while deriving the next fire time.
/// Only unrepresentable local times (DST gaps) ever need more than one step.
const MAX_FIRE_PROBES: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Scheduled,
    Running,
}

/// One recurring digest trigger for one user.
#[derive(Clone, Debug)]
pub struct DigestJob {
    pub user_id: i64,
    pub telegram_id: i64,
    pub delivery_time: NaiveTime,
    pub frequency: DeliveryFrequency,
    pub timezone: Tz,
    pub next_fire: DateTime<Utc>,
    pub state: JobState,
}

/// Task that fires per-user digest runs at their configured schedule.
pub struct DigestScheduler {
    db: Arc<Database>,
    service: Arc<SummaryService>,
    sink: Arc<dyn DeliverySink>,
    jobs: Mutex<HashMap<i64, DigestJob>>,
    /// Users with a run currently in flight. Guards against a trigger
    /// overlapping a stalled previous run for the same user.
    running_users: Mutex<HashSet<i64>>,
    /// While set, no jobs fire: the chat platform asked us to back off.
    pause_until: Mutex<Option<DateTime<Utc>>>,
    running: AtomicBool,
    poll_interval: Duration,
    rebuild_interval: Duration,
    weekly_anchor: Weekday,
}

impl DigestScheduler {
    pub fn new(
        db: Arc<Database>,
        service: Arc<SummaryService>,
        sink: Arc<dyn DeliverySink>,
        poll_interval: Duration,
        rebuild_interval: Duration,
        weekly_anchor: Weekday,
    ) -> Arc<Self> {
        info!(
            "Initializing DigestScheduler with poll interval {:?}, weekly anchor {}",
            poll_interval, weekly_anchor
        );
        Arc::new(Self {
            db,
            service,
            sink,
            jobs: Mutex::new(HashMap::new()),
            running_users: Mutex::new(HashSet::new()),
            pause_until: Mutex::new(None),
            running: AtomicBool::new(false),
            poll_interval,
            rebuild_interval,
            weekly_anchor,
        })
    }

    /// Starts the due-check loop.
    pub fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Starting DigestScheduler due-check loop.");
            self.spawn_due_check_loop();
        }
        Ok(())
    }

    /// Stops the due-check loop. In-flight runs keep going.
    pub fn stop(&self) {
        info!("Stopping DigestScheduler due-check loop.");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stops the loop and waits for every in-flight run to finish, so no
    /// summary write is cut off mid-flight.
    pub async fn shutdown(&self) {
        self.stop();
        loop {
            let inflight = self.running_users.lock().unwrap().len();
            if inflight == 0 {
                break;
            }
            debug!("Waiting for {inflight} in-flight digest runs to finish...");
            sleep(Duration::from_millis(100)).await;
        }
        info!("All in-flight digest runs finished.");
    }

    fn spawn_due_check_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        tokio::spawn(async move {
            let mut since_rebuild = Duration::ZERO;
            loop {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    info!("Due-check loop stopped.");
                    break;
                }
                since_rebuild += self.poll_interval;
                if since_rebuild >= self.rebuild_interval {
                    since_rebuild = Duration::ZERO;
                    if let Err(e) = self.rebuild().await {
                        error!("Periodic job table rebuild failed: {e}");
                    }
                }
                self.tick(Utc::now());
            }
        });
    }

    /// Recomputes the whole job table from the store's active-user set.
    /// Users with unschedulable settings are reported and left out.
    pub async fn rebuild(&self) -> Result<usize, DatabaseError> {
        let rows = self.db.user_table.select_scheduled().await?;
        let now = Utc::now();

        let mut table = HashMap::new();
        let mut invalid = Vec::new();
        for row in rows {
            match build_job(&row, now, self.weekly_anchor) {
                Ok(job) => {
                    table.insert(job.user_id, job);
                }
                Err(reason) => {
                    error!(
                        "User {} has an unschedulable digest configuration: {reason}",
                        row.telegram_id
                    );
                    invalid.push((row.telegram_id, reason));
                }
            }
        }

        let running: HashSet<i64> = self.running_users.lock().unwrap().clone();
        for (user_id, job) in table.iter_mut() {
            if running.contains(user_id) {
                job.state = JobState::Running;
            }
        }

        let count = table.len();
        *self.jobs.lock().unwrap() = table;
        info!("Scheduled digest jobs for {count} users.");

        for (telegram_id, reason) in invalid {
            self.deliver(telegram_id, &Notice::BadSchedule { reason })
                .await;
        }

        Ok(count)
    }

    /// Re-derives the job of a single user after their settings changed.
    /// Removes the job when the user or their settings went inactive.
    pub async fn reschedule_user(&self, user_id: i64) -> Result<(), DatabaseError> {
        let Some(row) = self
            .db
            .user_table
            .select_scheduled_by_user_id(user_id)
            .await?
        else {
            if self.jobs.lock().unwrap().remove(&user_id).is_some() {
                info!("Removed digest job for inactive user {user_id}");
            }
            return Ok(());
        };

        match build_job(&row, Utc::now(), self.weekly_anchor) {
            Ok(mut job) => {
                if self.running_users.lock().unwrap().contains(&user_id) {
                    job.state = JobState::Running;
                }
                info!(
                    "Rescheduled digest for user {}: next fire at {}",
                    row.telegram_id, job.next_fire
                );
                self.jobs.lock().unwrap().insert(user_id, job);
            }
            Err(reason) => {
                error!(
                    "User {} has an unschedulable digest configuration: {reason}",
                    row.telegram_id
                );
                self.jobs.lock().unwrap().remove(&user_id);
                self.deliver(row.telegram_id, &Notice::BadSchedule { reason })
                    .await;
            }
        }
        Ok(())
    }

    /// Runs the digest for one user immediately, outside their schedule.
    /// Returns false when a run for that user is already in flight.
    pub async fn run_user_now(self: &Arc<Self>, user_id: i64) -> bool {
        if !self.begin_run(user_id) {
            info!("A digest run for user {user_id} is already in flight, skipping");
            return false;
        }
        self.run_user(user_id).await;
        self.finish_run(user_id);
        true
    }

    /// One pass of the due-check loop.
    fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        if self.is_paused(now) {
            return;
        }

        let due: Vec<DigestJob> = {
            let mut jobs = self.jobs.lock().unwrap();
            let mut fired = Vec::new();
            for job in jobs.values_mut() {
                if job.next_fire > now {
                    continue;
                }
                job.next_fire = next_fire(
                    now,
                    job.delivery_time,
                    job.frequency,
                    job.timezone,
                    self.weekly_anchor,
                );
                fired.push(job.clone());
            }
            fired
        };

        for job in due {
            self.spawn_run(job);
        }
    }

    fn spawn_run(self: &Arc<Self>, job: DigestJob) {
        if !self.begin_run(job.user_id) {
            info!(
                "Previous digest run for user {} still in flight, skipping this trigger",
                job.telegram_id
            );
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.run_user(job.user_id).await;
            this.finish_run(job.user_id);
        });
    }

    fn begin_run(&self, user_id: i64) -> bool {
        let inserted = self.running_users.lock().unwrap().insert(user_id);
        if inserted && let Some(job) = self.jobs.lock().unwrap().get_mut(&user_id) {
            job.state = JobState::Running;
        }
        inserted
    }

    fn finish_run(&self, user_id: i64) {
        self.running_users.lock().unwrap().remove(&user_id);
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&user_id) {
            job.state = JobState::Scheduled;
        }
    }

    async fn run_user(&self, user_id: i64) {
        let user = match self.db.user_table.select(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("User {user_id} vanished, removing their digest job");
                self.jobs.lock().unwrap().remove(&user_id);
                return;
            }
            Err(e) => {
                error!("Loading user {user_id} failed: {e}");
                return;
            }
        };

        debug!("Running digest for user {}", user.telegram_id);
        let report = match self.service.run_for_user(&user).await {
            Ok(report) => report,
            Err(e) => {
                error!("Digest run for user {} failed: {e}", user.telegram_id);
                return;
            }
        };

        if let Some(retry_after) = report.rate_limited {
            self.pause_for(retry_after);
        }

        self.deliver_report(&user, &report).await;
    }

    async fn deliver_report(&self, user: &UserModel, report: &UserRunReport) {
        if report.is_empty() {
            self.deliver(user.telegram_id, &Notice::NothingToDo).await;
            return;
        }

        for outcome in &report.outcomes {
            let notice = match &outcome.result {
                Ok(PipelineOutcome::Summarized(summary)) => Notice::Summary {
                    chat_title: outcome.chat_title.clone(),
                    text: summary.content.clone(),
                },
                Ok(PipelineOutcome::NoNewMessages) => Notice::NoNewMessages {
                    chat_title: outcome.chat_title.clone(),
                },
                Err(e) => Notice::Failure {
                    chat_title: outcome.chat_title.clone(),
                    reason: e.to_string(),
                },
            };
            self.deliver(user.telegram_id, &notice).await;
        }
    }

    async fn deliver(&self, telegram_id: i64, notice: &Notice) {
        if let Err(e) = self.sink.deliver(telegram_id, notice).await {
            error!("Delivering notice to user {telegram_id} failed: {e}");
        }
    }

    /// Pauses all firing until `wait` has elapsed. An existing longer pause
    /// wins.
    fn pause_for(&self, wait: Duration) {
        let until = Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut pause = self.pause_until.lock().unwrap();
        if pause.is_none_or(|existing| until > existing) {
            warn!("Chat platform rate limit: pausing all digest activity until {until}");
            *pause = Some(until);
        }
    }

    /// Whether firing is currently suspended. Clears an expired pause.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        let mut pause = self.pause_until.lock().unwrap();
        match *pause {
            Some(until) if now < until => true,
            Some(_) => {
                info!("Rate limit pause expired, resuming digest activity");
                *pause = None;
                false
            }
            None => false,
        }
    }

    pub fn job_for(&self, user_id: i64) -> Option<DigestJob> {
        self.jobs.lock().unwrap().get(&user_id).cloned()
    }

    pub fn jobs_snapshot(&self) -> Vec<DigestJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

fn build_job(
    row: &ScheduledUserRow,
    now: DateTime<Utc>,
    anchor: Weekday,
) -> Result<DigestJob, String> {
    let delivery_time = parse_delivery_time(&row.delivery_time).ok_or(format!(
        "`{}` is not a valid HH:MM delivery time",
        row.delivery_time
    ))?;
    let frequency = row.delivery_frequency.parse::<DeliveryFrequency>()?;
    let timezone = row
        .timezone
        .parse::<Tz>()
        .map_err(|_| format!("`{}` is not a known timezone", row.timezone))?;

    Ok(DigestJob {
        user_id: row.user_id,
        telegram_id: row.telegram_id,
        delivery_time,
        frequency,
        timezone,
        next_fire: next_fire(now, delivery_time, frequency, timezone, anchor),
        state: JobState::Scheduled,
    })
}

/// The first instant strictly after `now` at which a job with the given
/// settings fires: daily at `time` in `tz`, or weekly on `anchor` at `time`.
fn next_fire(
    now: DateTime<Utc>,
    time: NaiveTime,
    frequency: DeliveryFrequency,
    tz: Tz,
    anchor: Weekday,
) -> DateTime<Utc> {
    let mut date = now.with_timezone(&tz).date_naive();
    let step_days = match frequency {
        DeliveryFrequency::Daily => 1,
        DeliveryFrequency::Weekly => 7,
    };

    if frequency == DeliveryFrequency::Weekly {
        while date.weekday() != anchor {
            date = date.succ_opt().unwrap_or(date);
        }
    }

    for _ in 0..MAX_FIRE_PROBES {
        if let Some(candidate) = resolve_local(&tz, date, time)
            && candidate > now
        {
            return candidate;
        }
        date = date + chrono::Days::new(step_days);
    }

    // Unreachable with a sane timezone database.
    now + chrono::Duration::days(step_days as i64)
}

/// Maps a local wall-clock time to UTC. Ambiguous times (DST fall-back) take
/// the earlier instant; skipped times (DST spring-forward) shift one hour
/// later.
fn resolve_local(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
        LocalResult::None => match tz.from_local_datetime(&(naive + chrono::Duration::hours(1))) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
            LocalResult::None => None,
        },
    }
}
