use crate::categories::CategoriesService;
use crate::context::RequestContext;
use crate::errors::TriviaError;
use crate::metrics_defs::REQUESTS_INFLIGHT;
use crate::questions::{QuestionParams, QuestionsService};
use crate::upstream::Upstream;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::gauge;
use shared::http::{full_body, make_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";

type ApiResponse = Response<BoxBody<Bytes, TriviaError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    Categories,
    Questions,
}

/// Inbound handler for `GET /categories` and `GET /questions`.
#[derive(Clone)]
pub struct TriviaApi {
    categories: Arc<CategoriesService>,
    questions: Arc<QuestionsService>,
    request_timeout: Duration,
}

impl TriviaApi {
    /// `request_timeout` bounds every request, including the time spent
    /// waiting on a categories refresh started by someone else.
    pub fn new(upstream: Arc<dyn Upstream>, request_timeout: Duration) -> Self {
        TriviaApi {
            categories: Arc::new(CategoriesService::new(upstream.clone())),
            questions: Arc::new(QuestionsService::new(upstream)),
            request_timeout,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> ApiResponse {
        let _inflight = InflightGuard::new();

        let endpoint = match req.uri().path() {
            "/categories" => Endpoint::Categories,
            "/questions" => Endpoint::Questions,
            path => {
                tracing::debug!(method = %req.method(), path, "No route matched");
                return make_error_response(StatusCode::NOT_FOUND);
            }
        };

        if req.method() != Method::GET {
            let mut response = make_error_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        let ctx = RequestContext::background().with_timeout(self.request_timeout);
        let result = match endpoint {
            Endpoint::Categories => self
                .categories
                .fetch(&ctx)
                .await
                .and_then(|categories| json_response(&categories)),
            Endpoint::Questions => {
                let params = question_params(req.uri().query());
                self.questions
                    .fetch(&ctx, &params)
                    .await
                    .and_then(|questions| json_response(&questions))
            }
        };

        result
            .or_else(error_response)
            .unwrap_or_else(|e| internal_error(endpoint, e))
    }
}

impl Service<Request<Incoming>> for TriviaApi {
    type Response = ApiResponse;
    type Error = TriviaError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let api = self.clone();
        Box::pin(async move { Ok(api.handle(req).await) })
    }
}

/// Reads the three question filters, keeping the first value of repeated keys.
fn question_params(query: Option<&str>) -> QuestionParams {
    let mut params = QuestionParams::default();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let slot = match key.as_ref() {
            "category" => &mut params.category,
            "difficulty" => &mut params.difficulty,
            "limit" => &mut params.limit,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    params
}

fn json_response<T: Serialize>(items: &[T]) -> Result<ApiResponse, TriviaError> {
    let body = serde_json::to_vec(items)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, APPLICATION_JSON_UTF8)
        .body(full_body(body))?)
}

/// Forwards upstream errors verbatim. Every other error is handed back for
/// [`internal_error`].
fn error_response(error: TriviaError) -> Result<ApiResponse, TriviaError> {
    let TriviaError::Upstream(upstream) = error else {
        return Err(error);
    };

    tracing::debug!(status = %upstream.status, "Passing upstream error through");
    let mut builder = Response::builder().status(upstream.status);
    if let Some(content_type) = &upstream.content_type {
        builder = builder.header(CONTENT_TYPE, content_type.as_str());
    }
    Ok(builder.body(full_body(upstream.body))?)
}

fn internal_error(endpoint: Endpoint, error: TriviaError) -> ApiResponse {
    tracing::error!(error = %error, endpoint = ?endpoint, "Request failed");
    make_text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n"))
}

/// Tracks the number of requests being processed, including ones dropped
/// mid-flight by a client disconnect.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}
