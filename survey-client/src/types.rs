use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Embedded data written onto a contact, in insertion order.
pub type EmbeddedData = IndexMap<String, String>;

/// A survey participant as supplied by the caller of the invite workflow.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Contact created in the platform directory.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Contact id (`CID_...`)
    pub id: String,
    /// Mailing-list scoped id (`CGC_...`) used as a distribution recipient.
    pub contact_lookup_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum DistributionKind {
    Invite,
    Reminder,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Distribution {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DistributionKind,
}

/// Reply to distribution and reminder creation. Reminders report `distributionId`.
#[derive(Deserialize)]
pub(crate) struct CreatedDistribution {
    #[serde(alias = "distributionId")]
    pub id: String,
}

/// Personal survey link resolved from a distribution.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_expiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Remaining fields of the link element, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryKind {
    Email,
    Response,
}

impl HistoryKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Email => "email",
            HistoryKind::Response => "response",
        }
    }
}

/// One row of a contact's or a distribution's history.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub distribution_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub survey_id: Option<String>,
}

impl HistoryEntry {
    pub fn is_invite(&self) -> bool {
        self.kind.as_deref() == Some("Invite")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub elements: Vec<T>,
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportStarted {
    pub progress_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ExportStatus {
    InProgress,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportProgress {
    pub status: ExportStatus,
    #[serde(default)]
    pub file_id: Option<String>,
}

/// Body of an uncompressed JSON export file. Not wrapped in an envelope.
#[derive(Deserialize)]
pub(crate) struct ExportFile {
    #[serde(default)]
    pub responses: Vec<serde_json::Value>,
}
