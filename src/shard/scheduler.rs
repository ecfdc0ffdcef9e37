//! Health scheduler state machine
//!
//! `NoMonitoring -> Scheduled -> Probing -> (Scheduled | NoMonitoring)`
//!
//! The persisted alarm row is the source of truth for "a timer is armed";
//! the in-memory URL cache is only a read optimization and is rebuilt from
//! the store after every activation. Each method returns the instant a
//! wake-up must be armed for, if any, and leaves delivery to the caller.

use crate::error::ShardResult;
use crate::shard::clock;
use crate::shard::health::normalize_health_urls;
use crate::shard::prober::Prober;
use crate::shard::store::ShardStore;
use crate::shard::types::{HealthSchedule, SchedulerState};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Wake-ups this close to the alarm instant count as due
const ALARM_TOLERANCE: Duration = Duration::from_millis(250);

/// Timing and retention knobs for health probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    /// Delay before the first probe after monitoring starts
    pub initial_delay: Duration,
    /// Delay between probe rounds
    pub interval: Duration,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// Records kept per URL
    pub history_limit: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
            history_limit: crate::shard::health::DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// What an alarm delivery did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlarmOutcome {
    /// No alarm was armed (already handled, or never set)
    Idle,
    /// The armed alarm lies in the future; this delivery was stale
    NotDue { due_at: String },
    /// A probe round ran
    Probed {
        checks: usize,
        next_probe_at: Option<String>,
    },
}

/// Wall-clock instant `delay` from now
fn after(delay: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365));
    Utc::now() + delay
}

pub(crate) struct HealthScheduler {
    settings: HealthSettings,
    prober: Arc<dyn Prober>,
    urls: Option<Vec<String>>,
    state: SchedulerState,
}

impl HealthScheduler {
    pub fn new(settings: HealthSettings, prober: Arc<dyn Prober>) -> Self {
        Self {
            settings,
            prober,
            urls: None,
            state: SchedulerState::NoMonitoring,
        }
    }

    /// Recover after activation: the persisted alarm (if any) needs a wake-up
    pub async fn activate(&mut self, store: &ShardStore) -> ShardResult<Option<DateTime<Utc>>> {
        self.urls = None;
        let alarm = store.health_alarm().await?;
        self.state = match alarm {
            Some(_) => SchedulerState::Scheduled,
            None => SchedulerState::NoMonitoring,
        };
        Ok(alarm)
    }

    async fn cached_urls(&mut self, store: &ShardStore) -> ShardResult<Vec<String>> {
        if let Some(urls) = &self.urls {
            return Ok(urls.clone());
        }
        let urls = store.health_urls().await?;
        self.urls = Some(urls.clone());
        Ok(urls)
    }

    /// Persist the URL list, arming the first probe only when no alarm exists
    pub async fn set_urls(
        &mut self,
        store: &ShardStore,
        urls: Vec<String>,
    ) -> ShardResult<(HealthSchedule, Option<DateTime<Utc>>)> {
        let urls = normalize_health_urls(urls)?;
        store.save_health_urls(&urls).await?;
        self.urls = Some(urls.clone());

        let mut arm = None;
        let mut next = store.health_alarm().await?;

        if next.is_none() && !urls.is_empty() {
            let at = after(self.settings.initial_delay);
            store.set_health_alarm(at).await?;
            self.transition(SchedulerState::Scheduled);
            next = Some(at);
            arm = Some(at);
        }

        // An armed alarm with an empty list is cancelled softly on its next fire
        Ok((self.snapshot(urls, next), arm))
    }

    /// Handle one alarm delivery
    pub async fn on_alarm(&mut self, store: &ShardStore) -> ShardResult<(AlarmOutcome, Option<DateTime<Utc>>)> {
        let Some(due) = store.health_alarm().await? else {
            tracing::debug!("Alarm delivered with nothing armed");
            return Ok((AlarmOutcome::Idle, None));
        };

        if due > after(ALARM_TOLERANCE) {
            tracing::debug!(due_at = %clock::format_timestamp(due), "Ignoring early alarm delivery");
            return Ok((
                AlarmOutcome::NotDue {
                    due_at: clock::format_timestamp(due),
                },
                None,
            ));
        }

        // The due row stays in place until the round is over, so a crash
        // mid-round is retried on the next activation
        self.transition(SchedulerState::Probing);

        let urls = self.cached_urls(store).await?;
        if urls.is_empty() {
            store.clear_health_alarm().await?;
            self.transition(SchedulerState::NoMonitoring);
            return Ok((
                AlarmOutcome::Probed {
                    checks: 0,
                    next_probe_at: None,
                },
                None,
            ));
        }

        let outcomes = join_all(urls.iter().map(|url| self.prober.probe(url))).await;

        let mut checks = 0;
        for (url, outcome) in urls.iter().zip(outcomes) {
            match store
                .record_health_check(url, outcome.status, outcome.latency_ms, self.settings.history_limit)
                .await
            {
                Ok(_) => checks += 1,
                Err(e) => tracing::error!(url = %url, error = %e, "Failed to record health check"),
            }
        }

        // Overwrites the due row in one step
        let next = after(self.settings.interval);
        store.set_health_alarm(next).await?;
        self.transition(SchedulerState::Scheduled);

        Ok((
            AlarmOutcome::Probed {
                checks,
                next_probe_at: Some(clock::format_timestamp(next)),
            },
            Some(next),
        ))
    }

    pub async fn status(&mut self, store: &ShardStore) -> ShardResult<HealthSchedule> {
        let urls = self.cached_urls(store).await?;
        let next = store.health_alarm().await?;
        Ok(self.snapshot(urls, next))
    }

    fn snapshot(&self, urls: Vec<String>, next: Option<DateTime<Utc>>) -> HealthSchedule {
        HealthSchedule {
            urls,
            state: self.state,
            next_probe_at: next.map(clock::format_timestamp),
        }
    }

    fn transition(&mut self, to: SchedulerState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "Health scheduler transition");
            self.state = to;
        }
    }
}
