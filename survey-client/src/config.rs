use crate::error::UpstreamError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const MAX_RETRY_WAIT_SECS: f64 = 300.0;

/// Connection and content settings for the survey platform.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    /// Sent as the `X-API-TOKEN` header on every call.
    pub api_token: String,
    /// API root, e.g. `https://yul1.qualtrics.com/API/v3`
    pub base_url: Url,
    pub directory_id: String,
    pub library_id: String,
    pub mailing_list_id: String,
    pub invite_message_id: String,
    pub reminder_message_id: String,
    pub distribution: DistributionHeader,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub export: ExportPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), UpstreamError> {
        if self.api_token.trim().is_empty() {
            return Err(UpstreamError::Config("api token is empty".into()));
        }
        if self.retry.attempts == 0 {
            return Err(UpstreamError::Config(
                "retry attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=MAX_RETRY_WAIT_SECS).contains(&self.retry.wait_secs) {
            return Err(UpstreamError::Config(format!(
                "retry wait must be between 0 and {MAX_RETRY_WAIT_SECS} seconds, got {}",
                self.retry.wait_secs
            )));
        }
        if self.export.max_polls == 0 {
            return Err(UpstreamError::Config(
                "export max_polls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Sender identity and subjects applied to invite and reminder emails.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct DistributionHeader {
    pub from_email: String,
    pub reply_to_email: String,
    pub from_name: String,
    pub invite_subject: String,
    pub reminder_subject: String,
    #[serde(default = "default_survey_link_type")]
    pub survey_link_type: String,
}

/// Applies to survey response fetches only; every other call is attempted once.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait_secs: f64,
}

impl RetryPolicy {
    pub fn wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_secs).unwrap_or_default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 5,
            wait_secs: 2.0,
        }
    }
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct ExportPolicy {
    pub poll_interval_ms: u64,
    /// Progress checks allowed before the export is abandoned.
    pub max_polls: u32,
}

impl ExportPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ExportPolicy {
    fn default() -> Self {
        ExportPolicy {
            poll_interval_ms: 1000,
            max_polls: 600,
        }
    }
}

pub fn default_timeout_secs() -> u64 {
    5
}

pub fn default_survey_link_type() -> String {
    "Individual".into()
}
