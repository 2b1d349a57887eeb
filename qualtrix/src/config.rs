use crate::logging::LoggingConfig;
use crate::metrics::MetricsConfig;
use intake::config::{Config as IntakeConfig, EmbeddedLabels, InviteConfig, Listener};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::fs::File;
use std::str::FromStr;
use survey_client::UpstreamError;
use survey_client::config::{
    Config as UpstreamConfig, DistributionHeader, ExportPolicy, RetryPolicy,
    default_survey_link_type,
};
use url::Url;

const VCAP_SERVICES: &str = "VCAP_SERVICES";
const VCAP_SERVICE_NAME: &str = "qualtrix";
const ENV_PREFIX: &str = "QUALTRIX_";
const DEFAULT_STATSD_PORT: u16 = 8125;

#[derive(Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    pub intake: IntakeConfig,
    pub upstream: UpstreamConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from environment variables looked up through
    /// `lookup`. Upstream settings come from the `qualtrix` entry of
    /// `VCAP_SERVICES` when that variable is set, otherwise from `QUALTRIX_*`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let settings = match env.get(VCAP_SERVICES) {
            Some(blob) => Settings::Vcap(vcap_credentials(&blob)?),
            None => Settings::Env(env),
        };

        let logging = LoggingConfig {
            level: env
                .get("LOG_LEVEL")
                .unwrap_or_else(crate::logging::default_level),
            sentry_dsn: env.get("SENTRY_DSN"),
        };

        let metrics = match env.get("STATSD_HOST") {
            Some(statsd_host) => Some(MetricsConfig {
                statsd_host,
                statsd_port: env.parse("STATSD_PORT")?.unwrap_or(DEFAULT_STATSD_PORT),
                prefix: crate::metrics::default_prefix(),
            }),
            None => None,
        };

        let defaults = Listener::default();
        let admin_defaults = Listener::admin_default();
        let intake = IntakeConfig {
            listener: Listener {
                host: env.get("HOST").unwrap_or(defaults.host),
                port: env.parse("PORT")?.unwrap_or(defaults.port),
            },
            admin_listener: Listener {
                host: admin_defaults.host,
                port: env.parse("ADMIN_PORT")?.unwrap_or(admin_defaults.port),
            },
            invite: InviteConfig {
                reminder_offsets_minutes: match settings.get("reminder_offsets_minutes") {
                    Some(raw) => parse_list(&settings.name("reminder_offsets_minutes"), &raw)?,
                    None => intake::config::default_reminder_offsets_minutes(),
                },
                labels: EmbeddedLabels {
                    demographics_survey: settings.required("demographics_survey_label")?,
                    rules_consent_id: settings.required("rules_consent_id_label")?,
                    survey_swap_id: settings.required("survey_swap_id_label")?,
                    survey_swap_group: settings.required("survey_swap_group_label")?,
                },
                timestamp_utc_offset_hours: intake::config::default_timestamp_utc_offset_hours(),
            },
            shutdown_grace_secs: intake::config::default_shutdown_grace_secs(),
        };

        let retry_defaults = RetryPolicy::default();
        let upstream = UpstreamConfig {
            api_token: settings.required("api_token")?,
            base_url: settings.parse_required::<Url>("base_url")?,
            directory_id: settings.required("directory_id")?,
            library_id: settings.required("library_id")?,
            mailing_list_id: settings.required("mailing_list_id")?,
            invite_message_id: settings.required("invite_message_id")?,
            reminder_message_id: settings.required("reminder_message_id")?,
            distribution: DistributionHeader {
                from_email: settings.required("from_email")?,
                reply_to_email: settings.required("reply_to_email")?,
                from_name: settings.required("from_name")?,
                invite_subject: settings.required("invite_subject")?,
                reminder_subject: settings.required("reminder_subject")?,
                survey_link_type: settings
                    .get("survey_link_type")
                    .unwrap_or_else(default_survey_link_type),
            },
            retry: RetryPolicy {
                attempts: settings
                    .parse("retry_attempts")?
                    .unwrap_or(retry_defaults.attempts),
                wait_secs: settings
                    .parse("retry_wait")?
                    .unwrap_or(retry_defaults.wait_secs),
            },
            export: ExportPolicy::default(),
            timeout_secs: settings
                .parse("timeout")?
                .unwrap_or(survey_client::config::default_timeout_secs()),
        };

        let config = Config {
            logging,
            metrics,
            intake,
            upstream,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.intake.validate()?;
        self.upstream.validate()?;
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    Load(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("could not parse VCAP_SERVICES: {0}")]
    Json(#[from] serde_json::Error),
    #[error("VCAP_SERVICES has no user-provided service named qualtrix")]
    MissingService,
    #[error("missing setting: {0}")]
    MissingVar(String),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: String, reason: String },
    #[error("invalid intake configuration: {0}")]
    Intake(#[from] intake::config::ValidationError),
    #[error("{0}")]
    Upstream(#[from] UpstreamError),
}

#[derive(Deserialize)]
struct VcapService {
    name: String,
    #[serde(default)]
    credentials: Map<String, Value>,
}

#[derive(Deserialize)]
struct VcapServices {
    #[serde(rename = "user-provided", default)]
    user_provided: Vec<VcapService>,
}

fn vcap_credentials(blob: &str) -> Result<Map<String, Value>, ConfigError> {
    let services: VcapServices = serde_json::from_str(blob)?;
    services
        .user_provided
        .into_iter()
        .find(|service| service.name == VCAP_SERVICE_NAME)
        .map(|service| service.credentials)
        .ok_or(ConfigError::MissingService)
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Comma separated values, e.g. `1440,4320`.
fn parse_list<T>(name: &str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_value(name, item))
        .collect()
}

/// Plain process environment. Empty values count as unset.
#[derive(Clone, Copy)]
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| parse_value(name, &raw))
            .transpose()
    }
}

/// Upstream and invite settings, keyed by lower-case setting name.
enum Settings<'a> {
    Vcap(Map<String, Value>),
    Env(Env<'a>),
}

impl Settings<'_> {
    fn name(&self, key: &str) -> String {
        match self {
            Settings::Vcap(_) => format!("{VCAP_SERVICES} credential {key}"),
            Settings::Env(_) => format!("{ENV_PREFIX}{}", key.to_ascii_uppercase()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match self {
            Settings::Vcap(credentials) => match credentials.get(key)? {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                // Lists are accepted for the reminder offsets.
                Value::Array(items) => Some(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                other => Some(other.to_string()),
            },
            Settings::Env(env) => env.get(&self.name(key)),
        }
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingVar(self.name(key)))
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| parse_value(&self.name(key), &raw))
            .transpose()
    }

    fn parse_required<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        parse_value(&self.name(key), &self.required(key)?)
    }
}
