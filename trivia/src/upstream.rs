use crate::context::RequestContext;
use crate::errors::TriviaError;
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use async_trait::async_trait;
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use shared::histogram;
use std::time::Instant;
use url::Url;

/// Header carrying the provider API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Raw upstream response. Any status, including >= 400, is a successful transport result.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Issues GET requests against the trivia provider.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches `path` relative to the provider base url with `query` attached.
    ///
    /// Fails only on transport problems or when `ctx` ends before the
    /// response body has been read.
    async fn request(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<UpstreamResponse, TriviaError>;
}

/// [`Upstream`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpUpstream {
    pub fn new(base_url: Url, api_key: String) -> Self {
        HttpUpstream {
            client: reqwest::Client::new(),
            base_url: with_trailing_slash(base_url),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn url_for(&self, path: &str, query: &[(&str, String)]) -> Result<Url, TriviaError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<UpstreamResponse, TriviaError> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn request(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<UpstreamResponse, TriviaError> {
        let url = self.url_for(path, query)?;
        let start = Instant::now();

        let outcome = ctx.run(self.send(url)).await;

        let status = match &outcome {
            Ok(Ok(response)) => response.status.as_str().to_owned(),
            Ok(Err(_)) => "error".to_owned(),
            Err(_) => "canceled".to_owned(),
        };
        histogram!(UPSTREAM_REQUEST_DURATION, "resource" => path.to_owned(), "status" => status)
            .record(start.elapsed().as_secs_f64());

        outcome?
    }
}

/// `Url::join` replaces the last path segment unless the base ends with '/'.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::testutils::{HistogramRecorder, start_test_server};
    use hyper::Response;
    use std::time::Duration;

    #[test]
    fn test_url_for() {
        let upstream = HttpUpstream::new(
            Url::parse("https://quizapi.io/api/v1").unwrap(),
            "key".into(),
        );

        let url = upstream.url_for("categories", &[]).unwrap();
        assert_eq!(url.as_str(), "https://quizapi.io/api/v1/categories");

        let url = upstream
            .url_for(
                "/questions",
                &[
                    ("category", "Linux & Bash".to_string()),
                    ("limit", "10".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://quizapi.io/api/v1/questions?category=Linux+%26+Bash&limit=10"
        );
        // The key never appears in the url.
        assert!(!url.as_str().contains("key"));
    }

    #[tokio::test]
    async fn test_request_sends_api_key_header() {
        let addr = start_test_server(|req| {
            let key = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let body = format!(
                r#"{{"path":"{}","query":"{}","key":"{}"}}"#,
                req.uri().path(),
                req.uri().query().unwrap_or_default(),
                key
            );
            Response::builder()
                .header(CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap()
        })
        .await;

        let base = Url::parse(&format!("http://{addr}/api/v1/")).unwrap();
        let upstream = HttpUpstream::new(base, "secret".into());

        let response = upstream
            .request(
                &RequestContext::background(),
                "questions",
                &[("difficulty", "easy".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            response.body.as_ref(),
            br#"{"path":"/api/v1/questions","query":"difficulty=easy","key":"secret"}"#
        );
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let addr = start_test_server(|_req| {
            Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header(CONTENT_TYPE, "application/json")
                .body(r#"{"error":"Unauthenticated"}"#.into())
                .unwrap()
        })
        .await;

        let upstream = HttpUpstream::new(Url::parse(&format!("http://{addr}/")).unwrap(), "".into());
        let response = upstream
            .request(&RequestContext::background(), "categories", &[])
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body.as_ref(), br#"{"error":"Unauthenticated"}"#);
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = HttpUpstream::new(Url::parse(&format!("http://{addr}/")).unwrap(), "k".into());
        let result = upstream
            .request(&RequestContext::background(), "categories", &[])
            .await;

        assert!(matches!(result, Err(TriviaError::Transport(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_request() {
        let addr = crate::testutils::start_silent_server().await;
        let upstream = HttpUpstream::new(Url::parse(&format!("http://{addr}/")).unwrap(), "k".into());

        let (ctx, handle) = RequestContext::with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let recorder = HistogramRecorder::default();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let result = upstream.request(&ctx, "categories", &[]).await;
        assert!(matches!(
            result,
            Err(TriviaError::Context(ContextError::Canceled))
        ));

        // Abandoned calls still show up in the duration histogram.
        assert_eq!(
            recorder.histograms(),
            vec![(
                "upstream.request.duration".to_string(),
                vec![
                    ("resource".to_string(), "categories".to_string()),
                    ("status".to_string(), "canceled".to_string()),
                ]
            )]
        );
    }
}
