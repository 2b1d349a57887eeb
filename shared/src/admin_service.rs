use crate::http::{AdminBody, make_boxed_error_response, make_json_response};
use crate::metrics_defs::MetricDef;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Snapshot reported by the readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminStatus {
    pub ready: bool,
    /// Background work still running after its request was answered.
    pub detached_tasks: usize,
}

/// Serves the operational endpoints on the admin listener:
///
/// - `GET /health`: liveness, always `ok`
/// - `GET /ready`: 200 with an [`AdminStatus`] body once ready, 503 otherwise
/// - `GET /metrics`: the catalogue of metric definitions emitted by the service
pub struct AdminService<F> {
    status: F,
    metrics: Arc<Vec<MetricDef>>,
}

impl<F> AdminService<F>
where
    F: Fn() -> AdminStatus,
{
    pub fn new(status: F, metrics: Vec<MetricDef>) -> Self {
        Self {
            status,
            metrics: Arc::new(metrics),
        }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> AdminStatus + Send + Sync + 'static,
{
    type Response = Response<AdminBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let status = (self.status)();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            if req.method() != Method::GET {
                return Ok(make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED));
            }

            let res = match req.uri().path() {
                "/health" => Response::new(Full::new(Bytes::from("ok\n")).boxed()),
                "/ready" if status.ready => make_json_response(StatusCode::OK, &status),
                "/ready" => make_json_response(StatusCode::SERVICE_UNAVAILABLE, &status),
                "/metrics" => make_json_response(StatusCode::OK, metrics.as_ref()),
                _ => make_boxed_error_response(StatusCode::NOT_FOUND),
            };
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::run_http_service;
    use crate::metrics_defs::MetricType;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;

    const REQUESTS: MetricDef = MetricDef {
        name: "requests",
        metric_type: MetricType::Counter,
        description: "Requests served",
    };

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_admin_endpoints() {
        let ready = Arc::new(AtomicBool::new(false));
        let ready_flag = ready.clone();
        let service = AdminService::new(
            move || AdminStatus {
                ready: ready_flag.load(Ordering::Relaxed),
                detached_tasks: 2,
            },
            vec![REQUESTS],
        );

        let port = free_port().await;
        tokio::spawn(async move {
            let _ = run_http_service::<_, _, std::io::Error>("127.0.0.1", port, service).await;
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let base = format!("http://127.0.0.1:{port}");

        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await.unwrap(), "ok\n");

        let not_ready = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(not_ready.status(), 503);

        ready.store(true, Ordering::Relaxed);
        let is_ready = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(is_ready.status(), 200);
        let body: serde_json::Value = is_ready.json().await.unwrap();
        assert_eq!(body["detached_tasks"], 2);

        let metrics = client.get(format!("{base}/metrics")).send().await.unwrap();
        let body: serde_json::Value = metrics.json().await.unwrap();
        assert_eq!(body[0]["name"], "requests");

        let missing = client.get(format!("{base}/nope")).send().await.unwrap();
        assert_eq!(missing.status(), 404);
    }
}
