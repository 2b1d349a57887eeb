//! Multi-step workflows against the survey platform.
//!
//! The invite workflow runs in two phases. Creating the contact, creating the
//! invite distribution and resolving its link happen before the caller gets a
//! reply, and any failure there aborts the request. Scheduling reminders and
//! tagging the contact are then submitted as detached tasks: they add no latency,
//! are not ordered with respect to each other, and a failure in either is only
//! logged. Nothing done in the first phase is rolled back.

use crate::config::{EmbeddedLabels, InviteConfig, ValidationError};
use crate::metrics_defs::INVITE_WORKFLOW_DURATION;
use crate::normalizer::INTAKE_EMAIL;
use crate::tasks::DetachedTasks;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use survey_client::types::{EmbeddedData, HistoryKind, Link, Participant};
use survey_client::{SurveyPlatform, UpstreamError};

// Consent ids are issued with the intake prefix and stored under the rules prefix.
const CONSENT_ID_PREFIX: &str = "FS";
const RULES_CONSENT_ID_PREFIX: &str = "R";

/// Campaign tracking values supplied alongside an invite.
#[derive(Clone, Debug, PartialEq)]
pub struct Campaign {
    pub rules_consent_id: String,
    pub survey_swap_id: String,
    pub survey_swap_group: String,
    pub utm_campaign: String,
    pub utm_medium: String,
    pub utm_source: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InviteRequest {
    pub target_survey_id: String,
    pub participant: Participant,
    pub campaign: Campaign,
}

#[derive(Clone)]
pub struct Orchestrator {
    platform: Arc<dyn SurveyPlatform>,
    tasks: DetachedTasks,
    reminder_offsets: Vec<chrono::Duration>,
    labels: EmbeddedLabels,
    timestamp_offset: FixedOffset,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn SurveyPlatform>,
        tasks: DetachedTasks,
        invite: &InviteConfig,
    ) -> Result<Self, ValidationError> {
        invite.validate()?;

        Ok(Orchestrator {
            platform,
            tasks,
            reminder_offsets: invite.reminder_offsets()?,
            labels: invite.labels.clone(),
            timestamp_offset: invite.timestamp_offset()?,
        })
    }

    /// Invites a new participant to the target survey and returns their personal link.
    pub async fn invite(&self, request: InviteRequest) -> Result<Link, UpstreamError> {
        let start = Instant::now();
        let participant = &request.participant;

        let entry = self
            .platform
            .create_directory_entry(
                &participant.email,
                &participant.first_name,
                &participant.last_name,
            )
            .await?;
        tracing::debug!(contact_id = %entry.id, "directory entry created");

        let distribution = self
            .platform
            .create_email_distribution(&entry.contact_lookup_id, &request.target_survey_id)
            .await?;
        tracing::debug!(distribution_id = %distribution.id, "invite distribution created");

        let link = self
            .platform
            .get_link(&request.target_survey_id, &distribution.id)
            .await?;

        let tags = campaign_tags(
            &self.labels,
            &link.link,
            &request,
            Utc::now().with_timezone(&self.timestamp_offset),
        );
        self.schedule_reminders(distribution.id);
        self.tag_contact(entry.id, tags);

        let elapsed = start.elapsed();
        shared::histogram!(INVITE_WORKFLOW_DURATION).record(elapsed.as_secs_f64());
        tracing::info!(elapsed_secs = elapsed.as_secs_f64(), "redirect link created");
        Ok(link)
    }

    fn schedule_reminders(&self, distribution_id: String) {
        let platform = self.platform.clone();
        let offsets = self.reminder_offsets.clone();

        self.tasks.submit("schedule_reminders", async move {
            let scheduled_at = Utc::now();
            for offset in offsets {
                let reminder = platform
                    .create_reminder_distribution(&distribution_id, scheduled_at + offset)
                    .await?;
                tracing::debug!(
                    %distribution_id,
                    reminder_id = %reminder.id,
                    "reminder scheduled"
                );
            }
            Ok::<_, UpstreamError>(())
        });
    }

    fn tag_contact(&self, contact_id: String, tags: EmbeddedData) {
        let platform = self.platform.clone();

        self.tasks.submit("tag_contact", async move {
            platform.tag_contact(&contact_id, &tags).await?;
            tracing::debug!(%contact_id, "contact tagged");
            Ok::<_, UpstreamError>(())
        });
    }

    /// Finds the invite already sent to the participant behind an intake response and
    /// returns its link for the target survey. Nothing is created.
    pub async fn resolve_existing_link(
        &self,
        survey_id: &str,
        response_id: &str,
        target_survey_id: &str,
    ) -> Result<Link, UpstreamError> {
        let response = self.platform.get_response(survey_id, response_id).await?;
        let email = response
            .get("values")
            .and_then(|values| values.get(INTAKE_EMAIL))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                UpstreamError::NotFound(
                    "Email could not be found, and redirect link could not be generated".into(),
                )
            })?;

        let contact = self
            .platform
            .search_contacts(None, email)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                UpstreamError::NotFound(
                    "Contact ID could not be found, and redirect link could not be generated"
                        .into(),
                )
            })?;

        let distribution_id = self
            .platform
            .contact_history(&contact.id, HistoryKind::Email)
            .await?
            .into_iter()
            .find(|entry| entry.is_invite())
            .and_then(|entry| entry.distribution_id)
            .ok_or_else(|| {
                UpstreamError::NotFound(
                    "Distribution ID could not be found, and redirect link could not be generated"
                        .into(),
                )
            })?;

        self.platform.get_link(target_survey_id, &distribution_id).await
    }

    pub async fn response_ids_for_contact(
        &self,
        contact_id: &str,
    ) -> Result<Vec<String>, UpstreamError> {
        let history = self
            .platform
            .contact_history(contact_id, HistoryKind::Response)
            .await?;
        Ok(history.into_iter().filter_map(|entry| entry.response_id).collect())
    }

    pub async fn response_ids_for_distribution(
        &self,
        distribution_id: &str,
    ) -> Result<Vec<String>, UpstreamError> {
        let history = self.platform.distribution_history(distribution_id).await?;
        Ok(history.into_iter().filter_map(|entry| entry.response_id).collect())
    }
}

/// Replaces `old` with `new` when `value` starts with it; otherwise returns `value`.
pub fn swap_prefix(old: &str, new: &str, value: &str) -> String {
    match value.strip_prefix(old) {
        Some(rest) => format!("{new}{rest}"),
        None => value.to_string(),
    }
}

/// Embedded data written onto a freshly invited contact.
pub fn campaign_tags(
    labels: &EmbeddedLabels,
    survey_link: &str,
    request: &InviteRequest,
    timestamp: DateTime<FixedOffset>,
) -> EmbeddedData {
    let campaign = &request.campaign;
    let participant = &request.participant;

    let mut tags = EmbeddedData::new();
    tags.insert(labels.demographics_survey.clone(), survey_link.to_string());
    tags.insert(
        labels.rules_consent_id.clone(),
        swap_prefix(
            CONSENT_ID_PREFIX,
            RULES_CONSENT_ID_PREFIX,
            &campaign.rules_consent_id,
        ),
    );
    tags.insert(labels.survey_swap_id.clone(), campaign.survey_swap_id.clone());
    tags.insert(
        labels.survey_swap_group.clone(),
        campaign.survey_swap_group.clone(),
    );
    tags.insert("utm_campaign".into(), campaign.utm_campaign.clone());
    tags.insert("utm_medium".into(), campaign.utm_medium.clone());
    tags.insert("utm_source".into(), campaign.utm_source.clone());
    tags.insert("firstName".into(), participant.first_name.clone());
    tags.insert("lastName".into(), participant.last_name.clone());
    tags.insert(
        "timestamp".into(),
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
    );
    tags
}
