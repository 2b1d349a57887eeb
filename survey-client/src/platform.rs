use crate::error::UpstreamError;
use crate::types::{
    ContactSummary, DirectoryEntry, Distribution, EmbeddedData, HistoryEntry, HistoryKind, Link,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Operations offered by the survey platform.
///
/// [`crate::SurveyClient`] talks to the real API; callers depend on this trait so
/// that workflows can be exercised against an in-memory platform.
#[async_trait]
pub trait SurveyPlatform: Send + Sync {
    /// Adds a contact to the configured mailing list.
    async fn create_directory_entry(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<DirectoryEntry, UpstreamError>;

    /// Sends the invite message for `survey_id` to a single contact, effective immediately.
    async fn create_email_distribution(
        &self,
        contact_lookup_id: &str,
        survey_id: &str,
    ) -> Result<Distribution, UpstreamError>;

    async fn create_reminder_distribution(
        &self,
        distribution_id: &str,
        send_at: DateTime<Utc>,
    ) -> Result<Distribution, UpstreamError>;

    /// Fails with [`UpstreamError::LinkNotPopulated`] until the platform has generated
    /// the distribution's links.
    async fn get_link(&self, survey_id: &str, distribution_id: &str)
    -> Result<Link, UpstreamError>;

    async fn tag_contact(
        &self,
        contact_id: &str,
        embedded_data: &EmbeddedData,
    ) -> Result<(), UpstreamError>;

    /// Returns the raw `result` of a single survey response.
    async fn get_response(&self, survey_id: &str, response_id: &str)
    -> Result<Value, UpstreamError>;

    async fn get_survey_schema(&self, survey_id: &str) -> Result<Value, UpstreamError>;

    /// Runs a full response export and returns the raw responses it contained.
    async fn result_export(&self, survey_id: &str) -> Result<Vec<Value>, UpstreamError>;

    async fn delete_session(&self, survey_id: &str, session_id: &str)
    -> Result<Value, UpstreamError>;

    /// Searches a directory by exact email. `None` searches the configured directory.
    async fn search_contacts(
        &self,
        directory_id: Option<&str>,
        email: &str,
    ) -> Result<Vec<ContactSummary>, UpstreamError>;

    async fn contact_history(
        &self,
        contact_id: &str,
        kind: HistoryKind,
    ) -> Result<Vec<HistoryEntry>, UpstreamError>;

    async fn distribution_history(
        &self,
        distribution_id: &str,
    ) -> Result<Vec<HistoryEntry>, UpstreamError>;
}
