//! Per-tenant log shard
//!
//! Every tenant owns one SQLite file and one actor. The store methods are
//! split by concern across the submodules (`ingest`, `query`, `stats`,
//! `retention`, `health`); the actor serializes calls to them.

pub mod actor;
pub mod alarm;
pub mod clock;
pub mod health;
pub mod ingest;
pub mod prober;
pub mod query;
pub mod retention;
pub mod scheduler;
pub mod schema;
pub mod stats;
pub mod store;
pub mod types;

pub use actor::{spawn_shard, ShardHandle, ShardOptions};
pub use alarm::AlarmScheduler;
pub use prober::{HttpProber, ProbeOutcome, Prober};
pub use query::LogQuery;
pub use scheduler::{AlarmOutcome, HealthSettings};
pub use store::{ShardStore, StoreOptions};
pub use types::{
    DailyStat, HealthCheckRecord, HealthSchedule, Level, LogEntry, LogInput, SchedulerState,
    StatsDelta,
};
