use crate::error::UpstreamError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Wrapper around every platform reply.
#[derive(Deserialize, Debug)]
pub(crate) struct Envelope {
    pub result: Option<Value>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Meta {
    #[serde(rename = "httpStatus")]
    pub http_status: Option<String>,
    pub error: Option<Value>,
}

impl Meta {
    fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let message = error
            .get("errorMessage")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        Some(message)
    }
}

/// Applies the envelope checks: an error field wins, then the HTTP status. Returns the
/// `result` payload, or `None` when the platform sent none.
pub(crate) fn open_envelope(
    operation: &'static str,
    status: StatusCode,
    body: &[u8],
) -> Result<Option<Value>, UpstreamError> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(UpstreamError::Status { operation, status });
        }
        Err(e) => {
            return Err(UpstreamError::Malformed {
                operation,
                reason: e.to_string(),
            });
        }
    };

    if let Some(message) = envelope.meta.error_message() {
        return Err(UpstreamError::Api(message));
    }

    if !status.is_success() {
        return Err(UpstreamError::Status { operation, status });
    }

    if let Some(reported) = envelope
        .meta
        .http_status
        .as_deref()
        .filter(|reported| !reported.starts_with('2'))
    {
        tracing::warn!(operation, reported, "envelope status disagrees with HTTP status");
    }

    Ok(envelope.result.filter(|result| !result.is_null()))
}

/// Decodes a required `result` payload into `T`.
pub(crate) fn decode_result<T: DeserializeOwned>(
    operation: &'static str,
    result: Option<Value>,
) -> Result<T, UpstreamError> {
    let result = result.ok_or(UpstreamError::MissingField {
        operation,
        field: "result",
    })?;
    serde_json::from_value(result).map_err(|e| UpstreamError::Malformed {
        operation,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_wins_over_success_status() {
        let body = br#"{"meta": {"httpStatus": "400 - Bad Request", "error": {"errorMessage": "Invalid survey", "errorCode": "Q_1"}}}"#;
        let err = open_envelope("test", StatusCode::OK, body).unwrap_err();
        assert!(err.is_explicit());
        assert_eq!(err.to_string(), "Invalid survey");
    }

    #[test]
    fn test_status_failure_without_payload() {
        let err = open_envelope("test", StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status {
                status: StatusCode::BAD_GATEWAY,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_result() {
        let body = br#"{"result": null, "meta": {"httpStatus": "200 - OK"}}"#;
        let result = open_envelope("test", StatusCode::OK, body).unwrap();
        assert!(result.is_none());

        let err = decode_result::<Value>("test", result).unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::MissingField {
                field: "result",
                ..
            }
        ));
    }

    #[test]
    fn test_plain_string_error() {
        let body = br#"{"meta": {"error": "token expired"}}"#;
        let err = open_envelope("test", StatusCode::UNAUTHORIZED, body).unwrap_err();
        assert_eq!(err.to_string(), "token expired");
    }
}
