//! Durable alarm wake-ups
//!
//! The alarm instant itself lives in the shard's config table; this module
//! only delivers wake-ups. A wake-up that arrives for an alarm that is no
//! longer due is ignored by the shard, so duplicate deliveries are harmless.

use chrono::{DateTime, Utc};

/// Platform timer that delivers a shard's alarm at `at`
///
/// Implementations must eventually call `ShardHandle::fire_alarm` for
/// `tenant`, activating the shard first if it was evicted.
pub trait AlarmScheduler: Send + Sync + 'static {
    fn schedule(&self, tenant: &str, at: DateTime<Utc>);
}

/// Sleep until the wall clock reaches `at`
///
/// Loops because the monotonic timer and the wall clock can drift apart over
/// a five minute sleep.
pub async fn sleep_until(at: DateTime<Utc>) {
    loop {
        match (at - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => tokio::time::sleep(remaining).await,
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_sleep_until_past_returns_immediately() {
        let start = Instant::now();
        sleep_until(Utc::now() - chrono::Duration::seconds(5)).await;
        assert!(start.elapsed().as_millis() < 50);
    }

    #[tokio::test]
    async fn test_sleep_until_waits_for_wall_clock() {
        let target = Utc::now() + chrono::Duration::milliseconds(80);
        sleep_until(target).await;
        assert!(Utc::now() >= target);
    }
}
