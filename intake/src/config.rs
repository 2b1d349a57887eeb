use chrono::FixedOffset;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Reminders further out than a year are rejected.
const MAX_REMINDER_OFFSET_MINUTES: u64 = 366 * 24 * 60;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("At least one reminder offset is required")]
    NoReminderOffsets,

    #[error("Reminder offset out of range: {0} minutes")]
    InvalidReminderOffset(u64),

    #[error("Timestamp offset out of range: {0} hours")]
    InvalidTimestampOffset(i32),

    #[error("Empty embedded data label: {0}")]
    EmptyLabel(&'static str),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    pub invite: InviteConfig,
    /// How long to wait for detached work on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.invite.validate()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    pub fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Settings of the invite workflow's detached steps.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct InviteConfig {
    /// One reminder is scheduled per entry, relative to the moment scheduling runs.
    #[serde(default = "default_reminder_offsets_minutes")]
    pub reminder_offsets_minutes: Vec<u64>,
    pub labels: EmbeddedLabels,
    /// Consumers of the contact tags expect Mountain Standard Time.
    #[serde(default = "default_timestamp_utc_offset_hours")]
    pub timestamp_utc_offset_hours: i32,
}

impl InviteConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reminder_offsets_minutes.is_empty() {
            return Err(ValidationError::NoReminderOffsets);
        }
        self.reminder_offsets()?;
        self.timestamp_offset()?;
        self.labels.validate()
    }

    pub fn reminder_offsets(&self) -> Result<Vec<chrono::Duration>, ValidationError> {
        self.reminder_offsets_minutes
            .iter()
            .map(|&minutes| {
                (minutes <= MAX_REMINDER_OFFSET_MINUTES)
                    .then(|| i64::try_from(minutes).ok())
                    .flatten()
                    .and_then(chrono::Duration::try_minutes)
                    .ok_or(ValidationError::InvalidReminderOffset(minutes))
            })
            .collect()
    }

    pub fn timestamp_offset(&self) -> Result<FixedOffset, ValidationError> {
        self.timestamp_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ValidationError::InvalidTimestampOffset(
                self.timestamp_utc_offset_hours,
            ))
    }
}

/// Embedded data keys, configured per client, under which campaign tags are written.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EmbeddedLabels {
    pub demographics_survey: String,
    pub rules_consent_id: String,
    pub survey_swap_id: String,
    pub survey_swap_group: String,
}

impl EmbeddedLabels {
    fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("demographics_survey", &self.demographics_survey),
            ("rules_consent_id", &self.rules_consent_id),
            ("survey_swap_id", &self.survey_swap_id),
            ("survey_swap_group", &self.survey_swap_group),
        ] {
            if value.is_empty() {
                return Err(ValidationError::EmptyLabel(name));
            }
        }
        Ok(())
    }
}

pub fn default_reminder_offsets_minutes() -> Vec<u64> {
    // One and three days.
    vec![24 * 60, 3 * 24 * 60]
}

pub fn default_timestamp_utc_offset_hours() -> i32 {
    -7
}

pub fn default_shutdown_grace_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse(
            r#"
invite:
    labels:
        demographics_survey: DemographicsSurveyLink
        rules_consent_id: RulesConsentID
        survey_swap_id: SurveyswapID
        survey_swap_group: SurveyswapGroup
"#,
        );
        assert_eq!(config.listener, Listener::default());
        assert_eq!(config.admin_listener.port, 8081);
        assert_eq!(config.invite.reminder_offsets_minutes, vec![1440, 4320]);
        assert_eq!(
            config.invite.timestamp_offset().unwrap(),
            FixedOffset::west_opt(7 * 3600).unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = parse(
            r#"
listener:
    host: 0.0.0.0
    port: 0
invite:
    reminder_offsets_minutes: []
    timestamp_utc_offset_hours: 30
    labels:
        demographics_survey: ""
        rules_consent_id: RulesConsentID
        survey_swap_id: SurveyswapID
        survey_swap_group: SurveyswapGroup
"#,
        );
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        config.listener.port = 8000;
        assert_eq!(config.validate(), Err(ValidationError::NoReminderOffsets));

        config.invite.reminder_offsets_minutes = vec![1];
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidTimestampOffset(30))
        );

        config.invite.timestamp_utc_offset_hours = -7;
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyLabel("demographics_survey"))
        );
    }

    #[test]
    fn test_reminder_offsets() {
        let invite = InviteConfig {
            reminder_offsets_minutes: vec![1, 60],
            labels: EmbeddedLabels {
                demographics_survey: "a".into(),
                rules_consent_id: "b".into(),
                survey_swap_id: "c".into(),
                survey_swap_group: "d".into(),
            },
            timestamp_utc_offset_hours: 0,
        };
        assert_eq!(
            invite.reminder_offsets(),
            Ok(vec![chrono::Duration::minutes(1), chrono::Duration::hours(1)])
        );
    }

    #[test]
    fn test_reminder_offsets_bounded() {
        let mut config = parse(
            r#"
invite:
    reminder_offsets_minutes: [1440, 527040]
    labels:
        demographics_survey: DemographicsSurveyLink
        rules_consent_id: RulesConsentID
        survey_swap_id: SurveyswapID
        survey_swap_group: SurveyswapGroup
"#,
        );
        assert!(config.validate().is_ok());

        for minutes in [527041, 200_000_000_000_000, u64::MAX] {
            config.invite.reminder_offsets_minutes = vec![1440, minutes];
            assert_eq!(
                config.validate(),
                Err(ValidationError::InvalidReminderOffset(minutes))
            );
            assert!(config.invite.reminder_offsets().is_err());
        }
    }
}
