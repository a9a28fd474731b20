use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Base URL of the upstream trivia provider
pub const DEFAULT_BASE_URL: &str = "https://quizapi.io/api/v1/";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener share port {0}")]
    PortConflict(u16),

    #[error("Upstream base url must use http or https, got {0}")]
    InvalidScheme(String),

    #[error("Upstream base url must not carry a query string")]
    QueryInBaseUrl,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,
}

/// Trivia proxy configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener serving `/categories` and `/questions`
    #[serde(default)]
    pub listener: Listener,
    /// Listener serving `/health` and `/ready`
    #[serde(default = "Listener::admin")]
    pub admin_listener: Listener,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener.port == self.admin_listener.port {
            return Err(ValidationError::PortConflict(self.listener.port));
        }

        self.upstream.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    fn admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: Listener::admin(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Outbound connection to the trivia provider
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Resource paths (`categories`, `questions`) are joined onto this url.
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Upper bound on a single inbound request, including the upstream call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::InvalidScheme(other.to_string())),
        }

        if self.base_url.query().is_some() {
            return Err(ValidationError::QueryInBaseUrl);
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid url")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
