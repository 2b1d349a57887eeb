//! Maps raw survey responses onto stable, named fields.
//!
//! A raw response carries two maps keyed by question id: `values` (choice codes and
//! free text) and `labels` (the human readable text of the chosen options). Which
//! question feeds which field is fixed by the lookup tables below. Fields the
//! respondent skipped come out as `null`.

use serde::Serialize;
use serde_json::{Map, Value};

/// Question ids of the quality-test survey, keyed by the field they feed.
pub struct QualityTestQuestions {
    pub tester_id: &'static str,
    pub test_type: &'static str,
    pub document_modification: &'static str,
    pub image_modification: &'static str,
    pub selfie_test_type: &'static str,
    pub device_type: &'static str,
    pub device_model_apple: &'static str,
    pub device_model_samsung: &'static str,
    pub device_model_google: &'static str,
    pub fake_id_type: &'static str,
    pub spoof_artifact_type: &'static str,
    pub document_type: &'static str,
    pub subject_alterations: &'static str,
    pub mask_type: &'static str,
}

pub const QUALITY_TEST: QualityTestQuestions = QualityTestQuestions {
    tester_id: "QID1",
    test_type: "QID2",
    document_modification: "QID4",
    image_modification: "QID5",
    selfie_test_type: "QID6",
    device_type: "QID7",
    device_model_apple: "QID8",
    device_model_samsung: "QID9",
    device_model_google: "QID10",
    fake_id_type: "QID12",
    spoof_artifact_type: "QID13",
    document_type: "QID15",
    subject_alterations: "QID17",
    mask_type: "QID18",
};

/// Keys of the demographic survey. Keys ending in `_TEXT` and the consent id are
/// read from `values`, the rest from `labels`.
pub struct DemographicQuestions {
    pub rules_consent_id: &'static str,
    pub ethnicity: &'static str,
    pub race: &'static str,
    pub gender: &'static str,
    pub age: &'static str,
    pub income: &'static str,
    pub education: &'static str,
    pub skin_tone: &'static str,
    pub image_redacted_request: &'static str,
    pub comments: &'static str,
}

pub const DEMOGRAPHIC: DemographicQuestions = DemographicQuestions {
    rules_consent_id: "RulesConsentID",
    ethnicity: "QID12",
    race: "QID36",
    gender: "QID14",
    age: "QID15_TEXT",
    income: "QID24",
    education: "QID25",
    skin_tone: "QID67",
    image_redacted_request: "QID53",
    comments: "QID38_TEXT",
};

/// Intake survey question holding the participant's email address.
pub const INTAKE_EMAIL: &str = "QID37_3";

const SURVEY_TYPE: &str = "survey_type";
const QUALITY_TEST_TYPE: &str = "quality_test";

/// Model question for a device type code: 1 Apple, 2 Samsung, 3 Google.
fn device_model_question(code: i64) -> Option<&'static str> {
    match code {
        1 => Some(QUALITY_TEST.device_model_apple),
        2 => Some(QUALITY_TEST.device_model_samsung),
        3 => Some(QUALITY_TEST.device_model_google),
        _ => None,
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("response has no {0} object")]
    MissingSection(&'static str),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedResponse {
    QualityTest(QualityTestAnswers),
    Demographic(DemographicAnswers),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityTestAnswers {
    pub tester_id: Option<Value>,
    pub test_type: Option<Value>,
    pub document_modification: DocumentModification,
    pub image_modification: Option<Value>,
    pub selfie_test_type: Option<Value>,
    pub device: Device,
    pub fake_id_type: Option<Value>,
    pub spoof_artifact_type: Option<Value>,
    pub document_type: Option<Value>,
    pub subject_alteration: SubjectAlteration,
    pub mask: Mask,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentModification {
    pub modifications: Option<Value>,
    pub descriptions: Option<Vec<Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Device {
    pub device_group: Option<Value>,
    pub device_model: Option<Value>,
    /// Free text; for devices outside the three known vendors this is the
    /// respondent's own description.
    pub device_details: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectAlteration {
    pub alterations: Option<Value>,
    pub descriptions: Option<Vec<Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mask {
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    pub description: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DemographicAnswers {
    pub rules_consent_id: Option<Value>,
    pub ethnicity: Option<Value>,
    pub race: Option<Value>,
    pub gender: Option<Value>,
    pub age: Option<Value>,
    pub income: Option<Value>,
    pub education: Option<Value>,
    pub skin_tone: Option<Value>,
    pub image_redacted_request: Option<Value>,
    pub comments: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    Complete,
    Incomplete,
}

/// Either the normalized answers or, when the response could not be normalized,
/// the raw result as received.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answers {
    Normalized(NormalizedResponse),
    Raw(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SurveyAnswers {
    pub status: ResponseStatus,
    pub response: Answers,
}

fn present(map: &Map<String, Value>, key: &str) -> Option<Value> {
    map.get(key).filter(|value| !value.is_null()).cloned()
}

/// Choice codes arrive as numbers or as numeric strings.
fn choice_key(choice: &Value) -> Option<String> {
    match choice {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn choice_code(choice: &Value) -> Option<i64> {
    match choice {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Free text typed next to the selected option of a single-choice question.
pub fn text(values: &Map<String, Value>, qid: &str) -> Option<Value> {
    let choice = choice_key(values.get(qid)?)?;
    present(values, &format!("{qid}_{choice}_TEXT"))
}

/// Free text typed next to each selected option of a multi-choice question.
/// `None` when the question was not answered at all.
pub fn text_list(values: &Map<String, Value>, qid: &str) -> Option<Vec<Value>> {
    let selected = match values.get(qid)? {
        Value::Array(choices) => choices.iter().filter_map(choice_key).collect::<Vec<_>>(),
        Value::Null => return None,
        single => choice_key(single).into_iter().collect(),
    };

    Some(
        selected
            .iter()
            .filter_map(|choice| present(values, &format!("{qid}_{choice}_TEXT")))
            .collect(),
    )
}

pub fn label(labels: &Map<String, Value>, qid: &str) -> Option<Value> {
    present(labels, qid)
}

fn quality_test(values: &Map<String, Value>, labels: &Map<String, Value>) -> QualityTestAnswers {
    let q = &QUALITY_TEST;

    let mut device = Device {
        device_group: label(labels, q.device_type),
        device_model: None,
        device_details: text(values, q.device_type),
    };
    let model_question = values
        .get(q.device_type)
        .and_then(choice_code)
        .and_then(device_model_question);
    if let Some(model_qid) = model_question {
        device.device_model = label(labels, model_qid);
        device.device_details = text(values, model_qid);
    }

    QualityTestAnswers {
        tester_id: label(labels, q.tester_id),
        test_type: label(labels, q.test_type),
        document_modification: DocumentModification {
            modifications: label(labels, q.document_modification),
            descriptions: text_list(values, q.document_modification),
        },
        image_modification: label(labels, q.image_modification),
        selfie_test_type: label(labels, q.selfie_test_type),
        device,
        fake_id_type: label(labels, q.fake_id_type),
        spoof_artifact_type: label(labels, q.spoof_artifact_type),
        document_type: label(labels, q.document_type),
        subject_alteration: SubjectAlteration {
            alterations: label(labels, q.subject_alterations),
            descriptions: text_list(values, q.subject_alterations),
        },
        mask: Mask {
            kind: label(labels, q.mask_type),
            description: text(values, q.mask_type),
        },
    }
}

fn demographic(values: &Map<String, Value>, labels: &Map<String, Value>) -> DemographicAnswers {
    let q = &DEMOGRAPHIC;

    DemographicAnswers {
        rules_consent_id: present(values, q.rules_consent_id),
        ethnicity: label(labels, q.ethnicity),
        race: label(labels, q.race),
        gender: label(labels, q.gender),
        age: present(values, q.age),
        income: label(labels, q.income),
        education: label(labels, q.education),
        skin_tone: label(labels, q.skin_tone),
        image_redacted_request: label(labels, q.image_redacted_request),
        comments: present(values, q.comments),
    }
}

fn section<'a>(
    result: &'a Value,
    name: &'static str,
) -> Result<&'a Map<String, Value>, NormalizeError> {
    result
        .get(name)
        .and_then(Value::as_object)
        .ok_or(NormalizeError::MissingSection(name))
}

/// Normalizes one raw response. Only fails when `values` or `labels` is missing.
pub fn normalize(result: &Value) -> Result<NormalizedResponse, NormalizeError> {
    let values = section(result, "values")?;
    let labels = section(result, "labels")?;

    let normalized = match values.get(SURVEY_TYPE).and_then(Value::as_str) {
        Some(QUALITY_TEST_TYPE) => NormalizedResponse::QualityTest(quality_test(values, labels)),
        _ => NormalizedResponse::Demographic(demographic(values, labels)),
    };
    Ok(normalized)
}

/// Normalizes every response that can be, skipping the rest.
pub fn normalize_all(results: &[Value]) -> Vec<NormalizedResponse> {
    results
        .iter()
        .filter_map(|result| match normalize(result) {
            Ok(normalized) => Some(normalized),
            Err(e) => {
                let response_id = result.get("responseId").and_then(Value::as_str);
                tracing::debug!(
                    response_id,
                    error = %e,
                    "skipping response"
                );
                None
            }
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

pub fn response_status(result: &Value) -> ResponseStatus {
    let finished = result
        .get("values")
        .and_then(|values| values.get("finished"))
        .is_some_and(is_truthy);

    if finished {
        ResponseStatus::Complete
    } else {
        ResponseStatus::Incomplete
    }
}

/// Status plus answers of a single response; falls back to the raw result when it
/// cannot be normalized.
pub fn survey_answers(result: Value) -> SurveyAnswers {
    let status = response_status(&result);
    let response = match normalize(&result) {
        Ok(normalized) => Answers::Normalized(normalized),
        Err(e) => {
            tracing::warn!(error = %e, "returning raw survey response");
            Answers::Raw(result)
        }
    };

    SurveyAnswers { status, response }
}
