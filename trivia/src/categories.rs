use crate::context::RequestContext;
use crate::errors::TriviaError;
use crate::resource::ResourceService;
use crate::upstream::Upstream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Categories change rarely, one upstream call per day is enough.
pub const CATEGORIES_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const CATEGORIES_PATH: &str = "categories";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Cached view of the provider's category list.
pub struct CategoriesService {
    resource: ResourceService<Category>,
}

impl CategoriesService {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        CategoriesService {
            resource: ResourceService::cached(upstream, CATEGORIES_PATH, CATEGORIES_TTL),
        }
    }

    pub async fn fetch(&self, ctx: &RequestContext) -> Result<Vec<Category>, TriviaError> {
        self.resource.fetch(ctx, &[]).await
    }
}
