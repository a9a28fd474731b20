use crate::context::{ContextError, RequestContext};
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use shared::counter;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry<T> {
    snapshot: Vec<T>,
    expires_at: Option<Instant>,
}

impl<T: Clone> CacheEntry<T> {
    /// A copy of the snapshot while it is unexpired and non-empty.
    fn fresh_copy(&self, now: Instant) -> Option<Vec<T>> {
        match self.expires_at {
            Some(expires_at) if now < expires_at && !self.snapshot.is_empty() => {
                Some(self.snapshot.clone())
            }
            _ => None,
        }
    }
}

/// Time-bounded snapshot of one upstream resource.
///
/// Readers share the lock while the snapshot is fresh. Refreshing takes the
/// write lock and re-checks freshness first, so callers that queued behind a
/// refresh reuse its result instead of issuing their own upstream call. The
/// entry is only written after the refresh succeeded; a failed or abandoned
/// refresh leaves the previous snapshot in place.
pub struct SnapshotCache<T> {
    resource: &'static str,
    ttl: Duration,
    entry: RwLock<CacheEntry<T>>,
}

impl<T: Clone> SnapshotCache<T> {
    pub fn new(resource: &'static str, ttl: Duration) -> Self {
        SnapshotCache {
            resource,
            ttl,
            entry: RwLock::new(CacheEntry {
                snapshot: Vec::new(),
                expires_at: None,
            }),
        }
    }

    /// Returns a copy of the cached snapshot, calling `refresh` to replace it
    /// when it is missing or expired.
    pub async fn get_or_refresh<F, Fut, E>(
        &self,
        ctx: &RequestContext,
        refresh: F,
    ) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: From<ContextError>,
    {
        let fresh = ctx.run(self.entry.read()).await?.fresh_copy(Instant::now());
        if let Some(snapshot) = fresh {
            counter!(CACHE_HIT, "resource" => self.resource).increment(1);
            return Ok(snapshot);
        }

        let mut entry = ctx.run(self.entry.write()).await?;

        // Another caller may have refreshed while this one waited for the lock.
        if let Some(snapshot) = entry.fresh_copy(Instant::now()) {
            counter!(CACHE_HIT, "resource" => self.resource).increment(1);
            return Ok(snapshot);
        }

        counter!(CACHE_MISS, "resource" => self.resource).increment(1);
        tracing::debug!(resource = self.resource, "Refreshing cached snapshot");

        let fresh = refresh().await?;
        entry.snapshot = fresh.clone();
        entry.expires_at = Some(Instant::now() + self.ttl);

        Ok(fresh)
    }
}
