use crate::config::{Config, DistributionHeader, ExportPolicy, RetryPolicy};
use crate::envelope::{decode_result, open_envelope};
use crate::error::UpstreamError;
use crate::metrics_defs::{
    EXPORT_POLLS, RESPONSE_FETCH_RETRIES, UPSTREAM_ERRORS, UPSTREAM_REQUEST_DURATION,
};
use crate::platform::SurveyPlatform;
use crate::types::{
    ContactSummary, CreatedDistribution, DirectoryEntry, Distribution, DistributionKind,
    EmbeddedData, ExportFile, ExportProgress, ExportStarted, ExportStatus, HistoryEntry,
    HistoryKind, Link, Page,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Instant;
use tokio::time::sleep;

const AUTH_HEADER: &str = "X-API-TOKEN";

// History endpoints page through `nextPage`; stop following after this many pages.
const MAX_HISTORY_PAGES: usize = 50;

/// Client for the survey platform REST API.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct SurveyClient {
    http: reqwest::Client,
    base_url: String,
    directory_id: String,
    library_id: String,
    mailing_list_id: String,
    invite_message_id: String,
    reminder_message_id: String,
    header: DistributionHeader,
    retry: RetryPolicy,
    export: ExportPolicy,
}

impl SurveyClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let mut token = HeaderValue::from_str(&config.api_token)
            .map_err(|e| UpstreamError::Config(format!("api token: {e}")))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(SurveyClient {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            directory_id: config.directory_id.clone(),
            library_id: config.library_id.clone(),
            mailing_list_id: config.mailing_list_id.clone(),
            invite_message_id: config.invite_message_id.clone(),
            reminder_message_id: config.reminder_message_id.clone(),
            header: config.distribution.clone(),
            retry: config.retry,
            export: config.export,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and collects the full body.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), UpstreamError> {
        let start = Instant::now();
        let result = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body.to_vec()))
        }
        .await;

        let status_tag = match &result {
            Ok((status, _)) => status.as_u16().to_string(),
            Err(_) => "transport".to_string(),
        };
        shared::histogram!(
            UPSTREAM_REQUEST_DURATION,
            "operation" => operation,
            "status" => status_tag
        )
        .record(start.elapsed().as_secs_f64());

        result.map_err(|e| {
            tracing::warn!(operation, error = %e, "upstream call failed");
            UpstreamError::from(e)
        })
    }

    /// Sends an enveloped call and returns its `result`, if any.
    async fn call(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<Value>, UpstreamError> {
        let (status, body) = self.send(operation, request).await?;
        open_envelope(operation, status, &body).inspect_err(|e| {
            shared::counter!(UPSTREAM_ERRORS, "operation" => operation).increment(1);
            tracing::debug!(operation, error = %e, "upstream rejected call");
        })
    }

    /// Sends a call whose reply is handed back untouched.
    async fn raw(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Value, UpstreamError> {
        let (status, body) = self.send(operation, request).await?;
        serde_json::from_slice(&body).map_err(|e| {
            shared::counter!(UPSTREAM_ERRORS, "operation" => operation).increment(1);
            if status.is_success() {
                UpstreamError::Malformed {
                    operation,
                    reason: e.to_string(),
                }
            } else {
                UpstreamError::Status { operation, status }
            }
        })
    }

    async fn collect_pages<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        first: RequestBuilder,
    ) -> Result<Vec<T>, UpstreamError> {
        let mut items = Vec::new();
        let mut request = first;

        for _ in 0..MAX_HISTORY_PAGES {
            let page: Page<T> = decode_result(operation, self.call(operation, request).await?)?;
            items.extend(page.elements);

            match page.next_page {
                Some(next) => request = self.http.get(next),
                None => return Ok(items),
            }
        }

        tracing::warn!(
            operation,
            pages = MAX_HISTORY_PAGES,
            "history has more pages, returning a truncated list"
        );
        Ok(items)
    }

    fn distribution_header(&self, subject: &str) -> Value {
        json!({
            "fromEmail": self.header.from_email,
            "replyToEmail": self.header.reply_to_email,
            "fromName": self.header.from_name,
            "subject": subject,
        })
    }
}

fn send_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl SurveyPlatform for SurveyClient {
    async fn create_directory_entry(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<DirectoryEntry, UpstreamError> {
        const OPERATION: &str = "create_directory_entry";
        let url = self.url(&format!(
            "/directories/{}/mailinglists/{}/contacts",
            self.directory_id, self.mailing_list_id
        ));
        let body = json!({
            "firstName": first_name,
            "lastName": last_name,
            "email": email,
        });

        decode_result(OPERATION, self.call(OPERATION, self.http.post(url).json(&body)).await?)
    }

    async fn create_email_distribution(
        &self,
        contact_lookup_id: &str,
        survey_id: &str,
    ) -> Result<Distribution, UpstreamError> {
        const OPERATION: &str = "create_email_distribution";
        let body = json!({
            "message": {
                "libraryId": self.library_id,
                "messageId": self.invite_message_id,
            },
            "recipients": {
                "mailingListId": self.mailing_list_id,
                "contactId": contact_lookup_id,
            },
            "header": self.distribution_header(&self.header.invite_subject),
            "surveyLink": {
                "surveyId": survey_id,
                "type": self.header.survey_link_type,
            },
            "sendDate": send_date(Utc::now()),
        });

        let created: CreatedDistribution = decode_result(
            OPERATION,
            self.call(OPERATION, self.http.post(self.url("/distributions")).json(&body))
                .await?,
        )?;

        Ok(Distribution {
            id: created.id,
            kind: DistributionKind::Invite,
        })
    }

    async fn create_reminder_distribution(
        &self,
        distribution_id: &str,
        send_at: DateTime<Utc>,
    ) -> Result<Distribution, UpstreamError> {
        const OPERATION: &str = "create_reminder_distribution";
        let url = self.url(&format!("/distributions/{distribution_id}/reminders"));
        let body = json!({
            "message": {
                "libraryId": self.library_id,
                "messageId": self.reminder_message_id,
            },
            "header": self.distribution_header(&self.header.reminder_subject),
            "sendDate": send_date(send_at),
        });

        let created: CreatedDistribution = decode_result(
            OPERATION,
            self.call(OPERATION, self.http.post(url).json(&body)).await?,
        )?;

        Ok(Distribution {
            id: created.id,
            kind: DistributionKind::Reminder,
        })
    }

    async fn get_link(
        &self,
        survey_id: &str,
        distribution_id: &str,
    ) -> Result<Link, UpstreamError> {
        const OPERATION: &str = "get_link";
        let url = self.url(&format!("/distributions/{distribution_id}/links"));
        let request = self.http.get(url).query(&[("surveyId", survey_id)]);

        let page: Page<Link> = decode_result(OPERATION, self.call(OPERATION, request).await?)?;
        page.elements
            .into_iter()
            .next()
            .ok_or(UpstreamError::LinkNotPopulated)
    }

    async fn tag_contact(
        &self,
        contact_id: &str,
        embedded_data: &EmbeddedData,
    ) -> Result<(), UpstreamError> {
        const OPERATION: &str = "tag_contact";
        let url = self.url(&format!(
            "/directories/{}/mailinglists/{}/contacts/{contact_id}",
            self.directory_id, self.mailing_list_id
        ));
        let body = json!({ "embeddedData": embedded_data });

        // Updates reply with metadata only.
        self.call(OPERATION, self.http.put(url).json(&body)).await?;
        Ok(())
    }

    async fn get_response(
        &self,
        survey_id: &str,
        response_id: &str,
    ) -> Result<Value, UpstreamError> {
        const OPERATION: &str = "get_response";
        let url = self.url(&format!("/surveys/{survey_id}/responses/{response_id}"));
        let attempts = self.retry.attempts.max(1);

        for attempt in 1..=attempts {
            match self.call(OPERATION, self.http.get(&url)).await {
                Ok(Some(result)) if !is_empty(&result) => return Ok(result),
                Ok(_) => {
                    tracing::warn!(response_id, attempt, "survey response not found");
                }
                Err(e) if e.is_explicit() => return Err(e),
                Err(e) => {
                    tracing::warn!(response_id, attempt, error = %e, "survey response fetch failed");
                }
            }

            if attempt < attempts {
                shared::counter!(RESPONSE_FETCH_RETRIES).increment(1);
                sleep(self.retry.wait()).await;
            }
        }

        Err(UpstreamError::ResponseNotFound)
    }

    async fn get_survey_schema(&self, survey_id: &str) -> Result<Value, UpstreamError> {
        let url = self.url(&format!("/surveys/{survey_id}/response-schema"));
        self.raw("get_survey_schema", self.http.get(url)).await
    }

    async fn result_export(&self, survey_id: &str) -> Result<Vec<Value>, UpstreamError> {
        const OPERATION: &str = "result_export";
        let exports_url = self.url(&format!("/surveys/{survey_id}/export-responses"));
        let body = json!({
            "format": "json",
            "compress": false,
            "sortByLastModifiedDate": true,
        });

        let started: ExportStarted = decode_result(
            OPERATION,
            self.call(OPERATION, self.http.post(&exports_url).json(&body))
                .await?,
        )?;
        let progress_url = format!("{exports_url}/{}", started.progress_id);

        let mut polls = 0;
        let file_id = loop {
            if polls >= self.export.max_polls {
                tracing::error!(survey_id, polls, "response export never completed");
                return Err(UpstreamError::ExportTimedOut(polls));
            }
            polls += 1;
            shared::counter!(EXPORT_POLLS).increment(1);

            let progress: ExportProgress = decode_result(
                OPERATION,
                self.call(OPERATION, self.http.get(&progress_url)).await?,
            )?;

            match progress.status {
                ExportStatus::Complete => {
                    break progress.file_id.ok_or(UpstreamError::MissingField {
                        operation: OPERATION,
                        field: "fileId",
                    })?;
                }
                ExportStatus::Failed => return Err(UpstreamError::ExportFailed),
                ExportStatus::InProgress | ExportStatus::Unknown => {
                    sleep(self.export.poll_interval()).await;
                }
            }
        };

        let file_url = format!("{exports_url}/{file_id}/file");
        let file = self.raw(OPERATION, self.http.get(file_url)).await?;
        let file: ExportFile =
            serde_json::from_value(file).map_err(|e| UpstreamError::Malformed {
                operation: OPERATION,
                reason: e.to_string(),
            })?;

        tracing::info!(
            survey_id,
            polls,
            responses = file.responses.len(),
            "response export complete"
        );
        Ok(file.responses)
    }

    async fn delete_session(
        &self,
        survey_id: &str,
        session_id: &str,
    ) -> Result<Value, UpstreamError> {
        let url = self.url(&format!("/surveys/{survey_id}/sessions/{session_id}"));
        let body = json!({ "close": "true" });
        self.raw("delete_session", self.http.post(url).json(&body))
            .await
    }

    async fn search_contacts(
        &self,
        directory_id: Option<&str>,
        email: &str,
    ) -> Result<Vec<ContactSummary>, UpstreamError> {
        const OPERATION: &str = "search_contacts";
        let directory_id = directory_id.unwrap_or(&self.directory_id);
        let url = self.url(&format!("/directories/{directory_id}/contacts/search"));
        let body = json!({
            "filter": {
                "filterType": "email",
                "comparison": "eq",
                "value": email,
            }
        });
        let request = self
            .http
            .post(url)
            .query(&[("includeEmbedded", "true")])
            .json(&body);

        let page: Page<ContactSummary> =
            decode_result(OPERATION, self.call(OPERATION, request).await?)?;
        Ok(page.elements)
    }

    async fn contact_history(
        &self,
        contact_id: &str,
        kind: HistoryKind,
    ) -> Result<Vec<HistoryEntry>, UpstreamError> {
        let url = self.url(&format!(
            "/directories/{}/contacts/{contact_id}/history",
            self.directory_id
        ));
        let request = self.http.get(url).query(&[("type", kind.as_str())]);
        self.collect_pages("contact_history", request).await
    }

    async fn distribution_history(
        &self,
        distribution_id: &str,
    ) -> Result<Vec<HistoryEntry>, UpstreamError> {
        let url = self.url(&format!("/distributions/{distribution_id}/history"));
        self.collect_pages("distribution_history", self.http.get(url))
            .await
    }
}
