//! Per-channel sliding one-hour delivery limit.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tripwire_common::types::NotificationChannel;
use tripwire_storage::AlertStore;

use crate::error::Result;

/// Combines an in-memory cache of recent successful sends with the
/// persisted attempt log.
///
/// The cache can only short-circuit to "limited"; "allowed" is always
/// confirmed by counting `pending` and `sent` attempts in the store, so a
/// restart or a second process never lets a channel exceed its limit.
/// Admission on one channel is serialized: the check and the caller's
/// `pending` insert happen under the same per-channel lock.
#[derive(Default)]
pub struct RateLimiter {
    recent: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Result of a rate-limit check.
///
/// Holds the channel's admission lock. Keep it alive until the attempt row
/// that claims the slot is persisted, then drop it.
pub struct Admission {
    pub allowed: bool,
    _gate: Option<OwnedMutexGuard<()>>,
}

fn window() -> Duration {
    Duration::hours(1)
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether the channel may send at `now`. A limit of zero
    /// disables limiting for the channel.
    pub async fn admit(
        &self,
        store: &AlertStore,
        channel: &NotificationChannel,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let limit = channel.rate_limit_per_hour;
        if limit == 0 {
            return Ok(Admission {
                allowed: true,
                _gate: None,
            });
        }

        let gate = self.gate(&channel.id).lock_owned().await;
        if self.cached_count(&channel.id, now) >= limit as usize {
            tracing::debug!(channel_id = %channel.id, limit, "Rate limited by cache");
            return Ok(Admission {
                allowed: false,
                _gate: Some(gate),
            });
        }
        let used = store
            .count_delivery_slots_since(&channel.id, now - window())
            .await?;
        Ok(Admission {
            allowed: used < u64::from(limit),
            _gate: Some(gate),
        })
    }

    /// Notes a successful send.
    pub fn record(&self, channel_id: &str, now: DateTime<Utc>) {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        let entry = recent.entry(channel_id.to_string()).or_default();
        prune(entry, now);
        entry.push_back(now);
    }

    fn gate(&self, channel_id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|p| p.into_inner());
        gates
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn cached_count(&self, channel_id: &str, now: DateTime<Utc>) -> usize {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        match recent.get_mut(channel_id) {
            Some(entry) => {
                prune(entry, now);
                entry.len()
            }
            None => 0,
        }
    }
}

fn prune(entry: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - window();
    while entry.front().is_some_and(|t| *t <= cutoff) {
        entry.pop_front();
    }
}
