use crate::config::{Config, DistributionHeader, ExportPolicy, RetryPolicy};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// A request as seen by the mock platform.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Value,
    pub token: Option<String>,
    pub received_at: Instant,
}

impl RecordedCall {
    pub fn is(&self, method: Method, path: &str) -> bool {
        self.method == method && self.path == path
    }
}

type Responder = dyn Fn(&RecordedCall) -> (StatusCode, Value) + Send + Sync;

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Arc<Responder>,
}

/// In-process stand-in for the survey platform. Every request is recorded and
/// answered by the responder closure.
pub struct MockUpstream {
    pub base_url: Url,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            calls: calls.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(record).with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockUpstream {
            base_url: Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            calls,
            handle,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.is(method.clone(), path))
            .count()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let call = RecordedCall {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(String::from),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        token: headers
            .get("x-api-token")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        received_at: Instant::now(),
    };
    let (status, value) = (state.responder)(&call);
    state.calls.lock().unwrap().push(call);
    (status, Json(value))
}

/// Wraps `result` in a successful platform envelope.
pub fn ok(result: Value) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        serde_json::json!({"result": result, "meta": {"httpStatus": "200 - OK", "requestId": "req-1"}}),
    )
}

/// A platform envelope carrying an error field.
pub fn platform_error(message: &str) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({"meta": {
            "httpStatus": "400 - Bad Request",
            "error": {"errorMessage": message, "errorCode": "QVAL_1"},
        }}),
    )
}

pub fn test_config(base_url: Url) -> Config {
    Config {
        api_token: "test-token".into(),
        base_url,
        directory_id: "POOL_1".into(),
        library_id: "UR_1".into(),
        mailing_list_id: "CG_1".into(),
        invite_message_id: "MS_invite".into(),
        reminder_message_id: "MS_reminder".into(),
        distribution: DistributionHeader {
            from_email: "noreply@example.gov".into(),
            reply_to_email: "help@example.gov".into(),
            from_name: "Example Agency".into(),
            invite_subject: "Share your feedback".into(),
            reminder_subject: "Reminder: share your feedback".into(),
            survey_link_type: "Individual".into(),
        },
        retry: RetryPolicy {
            attempts: 3,
            wait_secs: 0.01,
        },
        export: ExportPolicy {
            poll_interval_ms: 50,
            max_polls: 10,
        },
        timeout_secs: 5,
    }
}
