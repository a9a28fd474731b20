use crate::cache::SnapshotCache;
use crate::context::RequestContext;
use crate::errors::TriviaError;
use crate::translate::decode_entities;
use crate::upstream::Upstream;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// One upstream collection endpoint, optionally guarded by a [`SnapshotCache`].
///
/// A cached resource keeps a single snapshot regardless of the query it was
/// fetched with, so it is only suitable for endpoints that are always called
/// with the same query.
pub struct ResourceService<T> {
    upstream: Arc<dyn Upstream>,
    path: &'static str,
    cache: Option<SnapshotCache<T>>,
}

impl<T> ResourceService<T>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    pub fn uncached(upstream: Arc<dyn Upstream>, path: &'static str) -> Self {
        ResourceService {
            upstream,
            path,
            cache: None,
        }
    }

    pub fn cached(upstream: Arc<dyn Upstream>, path: &'static str, ttl: Duration) -> Self {
        ResourceService {
            upstream,
            path,
            cache: Some(SnapshotCache::new(path, ttl)),
        }
    }

    /// Fetches the collection. Upstream, transport and decode errors are
    /// returned as produced, never wrapped.
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TriviaError> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_refresh(ctx, || self.fetch_upstream(ctx, query))
                    .await
            }
            None => self.fetch_upstream(ctx, query).await,
        }
    }

    async fn fetch_upstream(
        &self,
        ctx: &RequestContext,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TriviaError> {
        let response = self.upstream.request(ctx, self.path, query).await?;
        decode_entities(response)
    }
}
