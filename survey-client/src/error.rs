use reqwest::StatusCode;

/// The single failure kind of the client. Variants only refine the message that
/// ends up in front of the caller.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("{0}")]
    Api(String),

    #[error("{operation}: upstream returned {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("{operation}: upstream result is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Link was not yet populated")]
    LinkNotPopulated,

    #[error("Survey response not found")]
    ResponseNotFound,

    #[error("Response export failed")]
    ExportFailed,

    #[error("Response export did not complete after {0} progress checks")]
    ExportTimedOut(u32),

    #[error("{0}")]
    NotFound(String),

    #[error("{operation}: malformed upstream payload: {reason}")]
    Malformed {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl UpstreamError {
    /// True when the platform explicitly rejected the call, as opposed to an empty
    /// or unreadable reply.
    pub fn is_explicit(&self) -> bool {
        matches!(self, UpstreamError::Api(_))
    }
}
