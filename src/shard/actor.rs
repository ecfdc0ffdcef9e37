//! Shard actor and its entry points
//!
//! One tokio task owns the [`ShardStore`] and drains a bounded mailbox, so
//! every call against a tenant is strictly serialized, including the time a
//! probe round spends waiting on the network. [`ShardHandle`] is the cheap,
//! cloneable front door the router talks to.

use crate::error::{ShardError, ShardResult};
use crate::shard::alarm::{self, AlarmScheduler};
use crate::shard::prober::Prober;
use crate::shard::query::{LogQuery, MAX_QUERY_LIMIT};
use crate::shard::scheduler::{AlarmOutcome, HealthScheduler, HealthSettings};
use crate::shard::store::ShardStore;
use crate::shard::types::{
    DailyStat, HealthCheckRecord, HealthSchedule, Level, LogEntry, LogInput, StatsDelta,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<ShardResult<T>>;

enum Command {
    Log(LogInput, Reply<LogEntry>),
    LogBatch(Vec<LogInput>, Reply<Vec<LogEntry>>),
    Query(LogQuery, Reply<Vec<LogEntry>>),
    Prune(String, Reply<u64>),
    RecordStats(Level, u32, Reply<DailyStat>),
    RecordStatsBatch(Vec<StatsDelta>, Reply<DailyStat>),
    GetStats(Option<String>, Reply<DailyStat>),
    GetStatsRange(u32, Reply<Vec<DailyStat>>),
    SetHealthUrls(Vec<String>, Reply<HealthSchedule>),
    HealthHistory(Option<String>, Option<u32>, Reply<Vec<HealthCheckRecord>>),
    HealthStatus(Reply<HealthSchedule>),
    Alarm(Option<Reply<AlarmOutcome>>),
    Shutdown(oneshot::Sender<()>),
}

/// Per-shard tuning
#[derive(Clone)]
pub struct ShardOptions {
    pub health: HealthSettings,
    pub max_query_limit: u32,
    pub default_history_limit: u32,
    pub mailbox_capacity: usize,
    pub prober: Arc<dyn Prober>,
    /// Platform timer; `None` delivers alarms from an in-process task that
    /// dies with the shard
    pub alarms: Option<Arc<dyn AlarmScheduler>>,
}

impl ShardOptions {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self {
            health: HealthSettings::default(),
            max_query_limit: MAX_QUERY_LIMIT,
            default_history_limit: crate::shard::health::DEFAULT_HISTORY_PAGE,
            mailbox_capacity: 256,
            prober,
            alarms: None,
        }
    }

    pub fn with_health(mut self, health: HealthSettings) -> Self {
        self.health = health;
        self
    }

    pub fn with_alarms(mut self, alarms: Arc<dyn AlarmScheduler>) -> Self {
        self.alarms = Some(alarms);
        self
    }
}

/// Where alarm wake-ups are delivered
enum AlarmTarget {
    Local(mpsc::WeakSender<Command>),
    Platform(Arc<dyn AlarmScheduler>),
}

struct ShardActor {
    tenant: String,
    store: ShardStore,
    scheduler: HealthScheduler,
    max_query_limit: u32,
    default_history_limit: u32,
    alarm_target: AlarmTarget,
}

/// Cloneable handle to a running shard
#[derive(Clone)]
pub struct ShardHandle {
    tenant: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for ShardHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardHandle")
            .field("tenant", &self.tenant)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Activate a shard over an already-initialized store
///
/// Recovery runs before the mailbox opens: a persisted alarm is re-armed so
/// a probe loop survives eviction and restarts.
pub async fn spawn_shard(
    tenant: impl Into<String>,
    store: ShardStore,
    options: ShardOptions,
) -> ShardResult<ShardHandle> {
    let tenant = tenant.into();
    let (tx, rx) = mpsc::channel(options.mailbox_capacity.max(1));

    let alarm_target = match options.alarms {
        Some(platform) => AlarmTarget::Platform(platform),
        None => AlarmTarget::Local(tx.downgrade()),
    };

    let mut actor = ShardActor {
        tenant: tenant.clone(),
        store,
        scheduler: HealthScheduler::new(options.health, options.prober),
        max_query_limit: options.max_query_limit,
        default_history_limit: options.default_history_limit,
        alarm_target,
    };

    if let Some(at) = actor.scheduler.activate(&actor.store).await? {
        tracing::info!(tenant = %tenant, due_at = %at, "Recovered pending health alarm");
        actor.arm(at);
    }

    let task_tenant = tenant.clone();
    tokio::spawn(async move {
        let result = std::panic::AssertUnwindSafe(actor.run(rx)).catch_unwind().await;
        if let Err(e) = result {
            tracing::error!(tenant = %task_tenant, panic = ?e, "Shard actor panicked");
        }
    });

    tracing::debug!(tenant = %tenant, "Shard activated");
    Ok(ShardHandle {
        tenant: tenant.into(),
        tx,
    })
}

impl ShardActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Log(input, reply) => {
                    let result = self.store.insert_log(input).await;
                    self.reply("log", reply, result);
                }
                Command::LogBatch(inputs, reply) => {
                    let result = self.store.insert_logs_batch(inputs).await;
                    self.reply("log_batch", reply, result);
                }
                Command::Query(query, reply) => {
                    let result = self.store.query_logs(&query, self.max_query_limit).await;
                    self.reply("query", reply, result);
                }
                Command::Prune(before, reply) => {
                    let result = self.store.prune_logs(&before).await;
                    if let Ok(deleted) = &result {
                        tracing::info!(tenant = %self.tenant, before = %before, deleted, "Pruned logs");
                    }
                    self.reply("prune_logs", reply, result);
                }
                Command::RecordStats(level, count, reply) => {
                    let result = self.store.record_stats(level, count).await;
                    self.reply("record_stats", reply, result);
                }
                Command::RecordStatsBatch(deltas, reply) => {
                    let result = self.store.record_stats_batch(&deltas).await;
                    self.reply("record_stats_batch", reply, result);
                }
                Command::GetStats(date, reply) => {
                    let result = self.store.get_stats(date.as_deref()).await;
                    self.reply("get_stats", reply, result);
                }
                Command::GetStatsRange(days, reply) => {
                    let result = self.store.get_stats_range(days).await;
                    self.reply("get_stats_range", reply, result);
                }
                Command::SetHealthUrls(urls, reply) => {
                    let result = match self.scheduler.set_urls(&self.store, urls).await {
                        Ok((schedule, arm)) => {
                            if let Some(at) = arm {
                                tracing::info!(
                                    tenant = %self.tenant,
                                    urls = schedule.urls.len(),
                                    due_at = %at,
                                    "Health monitoring scheduled"
                                );
                                self.arm(at);
                            }
                            Ok(schedule)
                        }
                        Err(e) => Err(e),
                    };
                    self.reply("set_health_urls", reply, result);
                }
                Command::HealthHistory(url, limit, reply) => {
                    let limit = limit.unwrap_or(self.default_history_limit);
                    let result = self.store.health_history(url.as_deref(), limit).await;
                    self.reply("get_health_history", reply, result);
                }
                Command::HealthStatus(reply) => {
                    let result = self.scheduler.status(&self.store).await;
                    self.reply("health_status", reply, result);
                }
                Command::Alarm(reply) => {
                    let result = self.on_alarm().await;
                    match reply {
                        Some(reply) => self.reply("alarm", reply, result),
                        None => {
                            if let Err(e) = result {
                                tracing::error!(tenant = %self.tenant, error = %e, "Health alarm failed");
                            }
                        }
                    }
                }
                Command::Shutdown(done) => {
                    self.store.close().await;
                    let _ = done.send(());
                    break;
                }
            }
        }

        tracing::debug!(tenant = %self.tenant, "Shard actor stopped");
    }

    async fn on_alarm(&mut self) -> ShardResult<AlarmOutcome> {
        let (outcome, arm) = self.scheduler.on_alarm(&self.store).await?;

        if let AlarmOutcome::Probed { checks, .. } = &outcome {
            tracing::info!(tenant = %self.tenant, checks, "Health probe round completed");
        }
        if let Some(at) = arm {
            self.arm(at);
        }

        Ok(outcome)
    }

    /// Deliver a wake-up for the persisted alarm at `at`
    fn arm(&self, at: DateTime<Utc>) {
        match &self.alarm_target {
            AlarmTarget::Platform(platform) => platform.schedule(&self.tenant, at),
            AlarmTarget::Local(weak) => {
                let weak = weak.clone();
                tokio::spawn(async move {
                    alarm::sleep_until(at).await;
                    if let Some(tx) = weak.upgrade() {
                        let _ = tx.send(Command::Alarm(None)).await;
                    }
                });
            }
        }
    }

    fn reply<T>(&self, op: &'static str, reply: Reply<T>, result: ShardResult<T>) {
        match &result {
            Err(e @ ShardError::Validation(_)) => {
                tracing::debug!(tenant = %self.tenant, op, error = %e, "Rejected invalid request");
            }
            Err(e) => {
                tracing::error!(tenant = %self.tenant, op, error = %e, "Shard operation failed");
            }
            Ok(_) => {}
        }

        // Caller may have given up waiting
        let _ = reply.send(result);
    }
}

impl ShardHandle {
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Whether the actor behind this handle has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> ShardResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> ShardError {
        ShardError::Unavailable(format!("shard '{}' is not running", self.tenant))
    }

    /// Insert one entry
    pub async fn log(&self, input: LogInput) -> ShardResult<LogEntry> {
        self.call(|reply| Command::Log(input, reply)).await
    }

    /// Insert a batch atomically; entries share one timestamp
    pub async fn log_batch(&self, inputs: Vec<LogInput>) -> ShardResult<Vec<LogEntry>> {
        self.call(|reply| Command::LogBatch(inputs, reply)).await
    }

    /// Filtered, newest-first, paginated entries
    pub async fn query(&self, query: LogQuery) -> ShardResult<Vec<LogEntry>> {
        self.call(|reply| Command::Query(query, reply)).await
    }

    /// Delete entries strictly older than `before`; returns the deleted count
    pub async fn prune_logs(&self, before: impl Into<String>) -> ShardResult<u64> {
        let before = before.into();
        self.call(|reply| Command::Prune(before, reply)).await
    }

    pub async fn record_stats(&self, level: Level, count: u32) -> ShardResult<DailyStat> {
        self.call(|reply| Command::RecordStats(level, count, reply)).await
    }

    pub async fn record_stats_batch(&self, deltas: Vec<StatsDelta>) -> ShardResult<DailyStat> {
        self.call(|reply| Command::RecordStatsBatch(deltas, reply)).await
    }

    /// Counters for `date` (`YYYY-MM-DD`, default today)
    pub async fn get_stats(&self, date: Option<String>) -> ShardResult<DailyStat> {
        self.call(|reply| Command::GetStats(date, reply)).await
    }

    pub async fn get_stats_range(&self, days: u32) -> ShardResult<Vec<DailyStat>> {
        self.call(|reply| Command::GetStatsRange(days, reply)).await
    }

    /// Replace the monitored URL list
    pub async fn set_health_urls(&self, urls: Vec<String>) -> ShardResult<HealthSchedule> {
        self.call(|reply| Command::SetHealthUrls(urls, reply)).await
    }

    /// Most recent probe records, newest first
    pub async fn get_health_history(
        &self,
        url: Option<String>,
        limit: Option<u32>,
    ) -> ShardResult<Vec<HealthCheckRecord>> {
        self.call(|reply| Command::HealthHistory(url, limit, reply)).await
    }

    pub async fn health_status(&self) -> ShardResult<HealthSchedule> {
        self.call(Command::HealthStatus).await
    }

    /// Platform timer callback
    pub async fn fire_alarm(&self) -> ShardResult<AlarmOutcome> {
        self.call(|reply| Command::Alarm(Some(reply))).await
    }

    /// Drain queued calls, close the store and stop the actor
    pub async fn shutdown(&self) -> ShardResult<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown(done))
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }
}
