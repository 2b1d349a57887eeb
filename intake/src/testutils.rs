use crate::config::{EmbeddedLabels, InviteConfig};
use crate::orchestrator::{Campaign, InviteRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;
use survey_client::types::{
    ContactSummary, DirectoryEntry, Distribution, DistributionKind, EmbeddedData, HistoryEntry,
    HistoryKind, Link, Participant,
};
use survey_client::{SurveyPlatform, UpstreamError};

/// In-memory platform that records the order of calls and answers with canned data.
/// Operations named in `failing` are rejected.
#[derive(Default)]
pub struct FakePlatform {
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
    reminders: Mutex<Vec<(String, DateTime<Utc>)>>,
    tags: Mutex<Vec<(String, EmbeddedData)>>,
}

impl FakePlatform {
    pub fn failing(operations: &[&'static str]) -> Self {
        FakePlatform {
            failing: operations.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn record(&self, operation: &'static str) -> Result<(), UpstreamError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if !self.failing.contains(operation) {
            return Ok(());
        }
        match operation {
            "get_link" => Err(UpstreamError::LinkNotPopulated),
            "get_response" => Err(UpstreamError::ResponseNotFound),
            _ => Err(UpstreamError::Api(format!("{operation} rejected"))),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reminder_dates(&self) -> Vec<DateTime<Utc>> {
        self.reminders.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn reminder_distributions(&self) -> Vec<String> {
        self.reminders
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn tags(&self) -> Vec<(String, EmbeddedData)> {
        self.tags.lock().unwrap().clone()
    }
}

fn history(kind: &str, distribution_id: Option<&str>, response_id: Option<&str>) -> HistoryEntry {
    HistoryEntry {
        kind: Some(kind.to_string()),
        distribution_id: distribution_id.map(String::from),
        response_id: response_id.map(String::from),
        survey_id: Some("SV_target".into()),
    }
}

#[async_trait]
impl SurveyPlatform for FakePlatform {
    async fn create_directory_entry(
        &self,
        _email: &str,
        _first_name: &str,
        _last_name: &str,
    ) -> Result<DirectoryEntry, UpstreamError> {
        self.record("create_directory_entry")?;
        Ok(DirectoryEntry {
            id: "CID_1".into(),
            contact_lookup_id: "CGC_1".into(),
        })
    }

    async fn create_email_distribution(
        &self,
        _contact_lookup_id: &str,
        _survey_id: &str,
    ) -> Result<Distribution, UpstreamError> {
        self.record("create_email_distribution")?;
        Ok(Distribution {
            id: "EMD_1".into(),
            kind: DistributionKind::Invite,
        })
    }

    async fn create_reminder_distribution(
        &self,
        distribution_id: &str,
        send_at: DateTime<Utc>,
    ) -> Result<Distribution, UpstreamError> {
        self.record("create_reminder_distribution")?;
        let mut reminders = self.reminders.lock().unwrap();
        reminders.push((distribution_id.to_string(), send_at));
        Ok(Distribution {
            id: format!("EMD_R{}", reminders.len()),
            kind: DistributionKind::Reminder,
        })
    }

    async fn get_link(
        &self,
        _survey_id: &str,
        distribution_id: &str,
    ) -> Result<Link, UpstreamError> {
        self.record("get_link")?;
        Ok(Link {
            link: format!("https://survey.example/l/{distribution_id}"),
            contact_id: Some("CID_1".into()),
            link_expiration: None,
            status: None,
            extra: Default::default(),
        })
    }

    async fn tag_contact(
        &self,
        contact_id: &str,
        embedded_data: &EmbeddedData,
    ) -> Result<(), UpstreamError> {
        self.record("tag_contact")?;
        self.tags
            .lock()
            .unwrap()
            .push((contact_id.to_string(), embedded_data.clone()));
        Ok(())
    }

    async fn get_response(
        &self,
        _survey_id: &str,
        response_id: &str,
    ) -> Result<Value, UpstreamError> {
        self.record("get_response")?;
        match response_id {
            "R_intake" => Ok(json!({
                "responseId": response_id,
                "values": {"QID37_3": "pat@example.com", "finished": 1},
                "labels": {},
            })),
            "R_no_email" => Ok(json!({"responseId": response_id, "values": {}, "labels": {}})),
            "R_demographic" => Ok(json!({
                "responseId": response_id,
                "values": {"finished": true, "RulesConsentID": "FS_1", "QID15_TEXT": "41"},
                "labels": {"QID14": "Man"},
            })),
            _ => Err(UpstreamError::ResponseNotFound),
        }
    }

    async fn get_survey_schema(&self, survey_id: &str) -> Result<Value, UpstreamError> {
        self.record("get_survey_schema")?;
        Ok(json!({"result": {"title": survey_id, "type": "object"}}))
    }

    async fn result_export(&self, _survey_id: &str) -> Result<Vec<Value>, UpstreamError> {
        self.record("result_export")?;
        Ok(vec![
            json!({"values": {"survey_type": "quality_test", "QID7": 1}, "labels": {"QID1": "tester-1", "QID8": "iPad"}}),
            json!({"values": {"QID15_TEXT": "29"}, "labels": {}}),
            json!({"responseId": "R_broken"}),
        ])
    }

    async fn delete_session(
        &self,
        _survey_id: &str,
        session_id: &str,
    ) -> Result<Value, UpstreamError> {
        self.record("delete_session")?;
        Ok(json!({"result": {"sessionId": session_id, "done": true}}))
    }

    async fn search_contacts(
        &self,
        _directory_id: Option<&str>,
        email: &str,
    ) -> Result<Vec<ContactSummary>, UpstreamError> {
        self.record("search_contacts")?;
        if email != "pat@example.com" {
            return Ok(Vec::new());
        }
        Ok(vec![ContactSummary {
            id: "CID_1".into(),
            email: Some(email.to_string()),
            first_name: Some("Pat".into()),
            last_name: Some("Doe".into()),
        }])
    }

    async fn contact_history(
        &self,
        _contact_id: &str,
        kind: HistoryKind,
    ) -> Result<Vec<HistoryEntry>, UpstreamError> {
        self.record("contact_history")?;
        Ok(match kind {
            HistoryKind::Email => vec![
                history("Reminder", Some("EMD_0"), None),
                history("Invite", Some("EMD_1"), None),
            ],
            HistoryKind::Response => vec![
                history("response", None, Some("R_1")),
                history("response", None, None),
                history("response", None, Some("R_2")),
            ],
        })
    }

    async fn distribution_history(
        &self,
        _distribution_id: &str,
    ) -> Result<Vec<HistoryEntry>, UpstreamError> {
        self.record("distribution_history")?;
        Ok(vec![
            history("Invite", Some("EMD_1"), Some("R_3")),
            history("Invite", Some("EMD_1"), None),
        ])
    }
}

pub fn invite_config() -> InviteConfig {
    InviteConfig {
        reminder_offsets_minutes: vec![24 * 60, 3 * 24 * 60],
        labels: EmbeddedLabels {
            demographics_survey: "DemographicsSurveyLink".into(),
            rules_consent_id: "RulesConsentID".into(),
            survey_swap_id: "SurveyswapID".into(),
            survey_swap_group: "SurveyswapGroup".into(),
        },
        timestamp_utc_offset_hours: -7,
    }
}

pub fn invite_request() -> InviteRequest {
    InviteRequest {
        target_survey_id: "SV_target".into(),
        participant: Participant {
            email: "pat@example.com".into(),
            first_name: "Pat".into(),
            last_name: "Doe".into(),
            response_id: None,
            language: None,
        },
        campaign: Campaign {
            rules_consent_id: "FS_5f2a".into(),
            survey_swap_id: "swap-9".into(),
            survey_swap_group: "group-b".into(),
            utm_campaign: "spring".into(),
            utm_medium: "email".into(),
            utm_source: "newsletter".into(),
        },
    }
}
