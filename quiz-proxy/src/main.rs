mod config;

use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the upstream API key.
const API_KEY_ENV: &str = "QUIZ_APP_API_KEY";

const DEFAULT_LOG_LEVEL: &str = "info";

const METRICS_PREFIX: &str = "quiz_proxy";

#[derive(Parser)]
#[command(name = "quiz-proxy", about = "Caching proxy in front of the QuizAPI trivia provider")]
enum CliCommand {
    /// Serve /categories and /questions
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// YAML config file; every setting has a default
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),
    #[error("invalid sentry dsn: {0}")]
    SentryDsn(#[from] sentry::types::ParseDsnError),
    #[error("could not create statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("could not install metrics recorder: {0}")]
    MetricsRecorder(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Trivia(#[from] trivia::errors::TriviaError),
}

fn main() {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Run(args) => run(args),
    };

    if let Err(e) = result {
        eprintln!("quiz-proxy: {e}");
        process::exit(1);
    }
}

fn run(args: RunArgs) -> Result<(), CliError> {
    // A missing .env file is fine, the environment may carry everything.
    dotenvy::dotenv().ok();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let _sentry = init_logging(config.common.logging.as_ref())?;
    if let Some(metrics) = &config.common.metrics {
        init_statsd(metrics)?;
    }

    let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("{API_KEY_ENV} is not set, the upstream will reject every request");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(trivia::run(config.proxy, api_key))?;

    Ok(())
}

/// Installs the fmt subscriber and, when a DSN is configured, Sentry with its
/// tracing layer. The returned guard flushes Sentry when dropped.
fn init_logging(
    logging: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(
            logging
                .and_then(|l| l.level.as_deref())
                .unwrap_or(DEFAULT_LOG_LEVEL),
        )?,
    };

    let sentry_guard = match logging.and_then(|l| l.sentry_dsn.as_deref()) {
        Some(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.parse()?),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    Ok(sentry_guard)
}

fn init_statsd(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder)
        .map_err(|e| CliError::MetricsRecorder(e.to_string()))?;

    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "Reporting metrics to statsd"
    );
    Ok(())
}
