//! Shard host
//!
//! Resolves a tenant id to exactly one live shard. Activation is lazy and
//! guarded by a per-tenant once-cell; eviction drains the mailbox and closes
//! the database file. The host is also the platform timer: an alarm that
//! comes due for an evicted shard activates it again before delivery.

use crate::config::Config;
use crate::error::{ShardError, ShardResult};
use crate::shard::alarm::{self, AlarmScheduler};
use crate::shard::{
    spawn_shard, HealthSettings, HttpProber, Prober, ShardHandle, ShardOptions, ShardStore,
    StoreOptions,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;

/// Longest accepted tenant id
const MAX_TENANT_ID_LEN: usize = 64;

const SHARD_FILE_EXTENSION: &str = "db";

/// Settings shared by every shard of a host
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub data_dir: PathBuf,
    pub store: StoreOptions,
    pub health: HealthSettings,
    pub max_query_limit: u32,
    pub default_history_limit: u32,
    pub mailbox_capacity: usize,
}

impl HostSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.storage.data_dir.clone(),
            store: config.storage.store_options(),
            health: config.health.settings(),
            max_query_limit: config.query.max_limit,
            default_history_limit: config.health.default_history_limit,
            mailbox_capacity: config.storage.mailbox_capacity,
        }
    }
}

type ShardSlot = Arc<OnceCell<ShardHandle>>;

struct HostInner {
    settings: HostSettings,
    prober: Arc<dyn Prober>,
    alarms: Arc<dyn AlarmScheduler>,
    shards: DashMap<String, ShardSlot>,
}

/// Delivers alarms through the host so evicted shards wake up again
struct HostAlarms {
    host: Weak<HostInner>,
}

impl AlarmScheduler for HostAlarms {
    fn schedule(&self, tenant: &str, at: DateTime<Utc>) {
        let host = self.host.clone();
        let tenant = tenant.to_string();

        tokio::spawn(async move {
            alarm::sleep_until(at).await;

            // Host dropped: process is shutting down, recovery re-arms later
            let Some(inner) = host.upgrade() else {
                return;
            };
            let host = ShardHost { inner };

            let result = match host.shard(&tenant).await {
                Ok(handle) => handle.fire_alarm().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(outcome) => tracing::debug!(tenant = %tenant, outcome = ?outcome, "Alarm delivered"),
                Err(e) => tracing::error!(tenant = %tenant, error = %e, "Failed to deliver alarm"),
            }
        });
    }
}

/// Registry of live shards, one per tenant
#[derive(Clone)]
pub struct ShardHost {
    inner: Arc<HostInner>,
}

impl ShardHost {
    pub fn new(settings: HostSettings, prober: Arc<dyn Prober>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<HostInner>| HostInner {
            settings,
            prober,
            alarms: Arc::new(HostAlarms { host: weak.clone() }),
            shards: DashMap::new(),
        });

        Self { inner }
    }

    /// Host with reqwest HEAD probes, configured from `config`
    pub fn from_config(config: &Config) -> Self {
        let settings = HostSettings::from_config(config);
        let prober = Arc::new(HttpProber::new(settings.health.probe_timeout));
        Self::new(settings, prober)
    }

    pub fn settings(&self) -> &HostSettings {
        &self.inner.settings
    }

    /// The live shard for `tenant`, activating it from disk if needed
    pub async fn shard(&self, tenant: &str) -> ShardResult<ShardHandle> {
        validate_tenant_id(tenant)?;

        // A retry covers a slot that was evicted or crashed under us
        for _ in 0..2 {
            let slot = self
                .inner
                .shards
                .entry(tenant.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let handle = slot.get_or_try_init(|| self.activate(tenant)).await?.clone();

            let current = self
                .inner
                .shards
                .get(tenant)
                .map(|entry| Arc::ptr_eq(entry.value(), &slot))
                .unwrap_or(false);

            if current && !handle.is_closed() {
                return Ok(handle);
            }

            if current {
                tracing::warn!(tenant = %tenant, "Dropping stopped shard instance");
                self.inner.shards.remove_if(tenant, |_, s| Arc::ptr_eq(s, &slot));
            } else {
                // Evicted while activating; this instance must not serve
                let _ = handle.shutdown().await;
            }
        }

        Err(ShardError::Unavailable(format!("shard '{}' could not be activated", tenant)))
    }

    async fn activate(&self, tenant: &str) -> ShardResult<ShardHandle> {
        let settings = &self.inner.settings;

        tokio::fs::create_dir_all(&settings.data_dir).await.map_err(|e| {
            ShardError::internal(format!(
                "failed to create data dir {}: {}",
                settings.data_dir.display(),
                e
            ))
        })?;

        let path = shard_path(&settings.data_dir, tenant);
        let store = ShardStore::open(&path, settings.store).await?;

        let options = ShardOptions {
            health: settings.health,
            max_query_limit: settings.max_query_limit,
            default_history_limit: settings.default_history_limit,
            mailbox_capacity: settings.mailbox_capacity,
            prober: self.inner.prober.clone(),
            alarms: Some(self.inner.alarms.clone()),
        };

        let handle = spawn_shard(tenant, store, options).await?;
        tracing::info!(tenant = %tenant, path = %path.display(), "Shard activated");
        Ok(handle)
    }

    /// Stop the tenant's shard; pending alarms stay armed on disk
    ///
    /// Returns whether a live instance was stopped.
    pub async fn evict(&self, tenant: &str) -> ShardResult<bool> {
        let Some((_, slot)) = self.inner.shards.remove(tenant) else {
            return Ok(false);
        };
        let Some(handle) = slot.get() else {
            return Ok(false);
        };

        match handle.shutdown().await {
            Ok(()) => {
                tracing::info!(tenant = %tenant, "Shard evicted");
                Ok(true)
            }
            // Already stopped
            Err(ShardError::Unavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Tenants with a live shard instance
    pub fn active_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .inner
            .shards
            .iter()
            .filter(|entry| entry.value().get().is_some_and(|h| !h.is_closed()))
            .map(|entry| entry.key().clone())
            .collect();
        tenants.sort();
        tenants
    }

    /// Tenants that have a shard file under the data directory
    pub async fn tenant_ids_on_disk(&self) -> ShardResult<Vec<String>> {
        let dir = &self.inner.settings.data_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ShardError::internal(format!(
                    "failed to read data dir {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut tenants = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShardError::internal(format!("failed to read data dir: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SHARD_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_tenant_id(stem).is_ok() {
                    tenants.push(stem.to_string());
                }
            }
        }

        tenants.sort();
        Ok(tenants)
    }

    /// Re-arm persisted alarms after a process restart
    ///
    /// Every shard on disk is activated once; shards without a pending alarm
    /// are evicted again. Returns the tenants whose alarm was recovered.
    pub async fn recover(&self) -> ShardResult<Vec<String>> {
        let mut armed = Vec::new();

        for tenant in self.tenant_ids_on_disk().await? {
            let handle = match self.shard(&tenant).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(tenant = %tenant, error = %e, "Failed to recover shard");
                    continue;
                }
            };

            let pending = match handle.health_status().await {
                Ok(status) => status.next_probe_at.is_some(),
                Err(e) => {
                    tracing::error!(tenant = %tenant, error = %e, "Failed to read health status during recovery");
                    continue;
                }
            };
            if pending {
                armed.push(tenant);
                continue;
            }

            if let Err(e) = self.evict(&tenant).await {
                tracing::error!(tenant = %tenant, error = %e, "Failed to evict idle shard after recovery");
            }
        }

        tracing::info!(recovered = armed.len(), "Shard recovery complete");
        Ok(armed)
    }

    /// Evict every live shard
    pub async fn shutdown(&self) {
        let tenants: Vec<String> = self.inner.shards.iter().map(|e| e.key().clone()).collect();

        for tenant in tenants {
            if let Err(e) = self.evict(&tenant).await {
                tracing::error!(tenant = %tenant, error = %e, "Failed to stop shard");
            }
        }
    }
}

/// Tenant ids become file names: ASCII alphanumerics, `-` and `_` only
pub fn validate_tenant_id(tenant: &str) -> ShardResult<()> {
    if tenant.is_empty() || tenant.len() > MAX_TENANT_ID_LEN {
        return Err(ShardError::validation(format!(
            "tenant id must be 1-{} characters",
            MAX_TENANT_ID_LEN
        )));
    }
    if !tenant.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ShardError::validation(format!(
            "tenant id '{}' may only contain letters, digits, '-' and '_'",
            tenant
        )));
    }
    Ok(())
}

fn shard_path(data_dir: &Path, tenant: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", tenant, SHARD_FILE_EXTENSION))
}
