pub mod api;
pub mod cache;
pub mod categories;
pub mod config;
pub mod context;
pub mod errors;
pub mod metrics_defs;
pub mod questions;
pub mod resource;
pub mod translate;
pub mod upstream;

#[cfg(test)]
mod testutils;

use api::TriviaApi;
use errors::TriviaError;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use upstream::HttpUpstream;

/// Serves the trivia API and the admin endpoints until either listener fails.
///
/// An empty `api_key` still starts both listeners, but `/ready` reports 503
/// and the upstream will reject every request.
pub async fn run(config: config::Config, api_key: String) -> Result<(), TriviaError> {
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let upstream = HttpUpstream::new(config.upstream.base_url.clone(), api_key);
    let ready = upstream.has_api_key();
    let api = TriviaApi::new(Arc::new(upstream), config.upstream.timeout());

    tracing::info!(base_url = %config.upstream.base_url, "Starting trivia proxy");

    let api_task = run_http_service(&config.listener.host, config.listener.port, api);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(move || ready),
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}
