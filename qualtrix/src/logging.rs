use serde::Deserialize;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `intake=debug,info`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Error events are forwarded to Sentry when set.
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            sentry_dsn: None,
        }
    }
}

pub fn default_level() -> String {
    "info".into()
}

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    Filter(#[from] ParseError),
    #[error("could not install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. The returned guard flushes pending Sentry
/// events when dropped, so it must live as long as the process.
pub fn init(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, LoggingError> {
    let filter = EnvFilter::try_new(&config.level)?;

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(sentry_layer)
        .try_init()?;

    Ok(guard)
}
