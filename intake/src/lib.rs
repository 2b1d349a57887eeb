//! The HTTP face of the gateway: request routing, response normalization and the
//! invite workflow, served next to an admin listener.

pub mod api;
pub mod config;
mod cors;
pub mod metrics_defs;
pub mod normalizer;
pub mod orchestrator;
pub mod tasks;

#[cfg(test)]
mod testutils;

use crate::api::AppState;
use crate::config::{Config, ValidationError};
use crate::orchestrator::Orchestrator;
use crate::tasks::DetachedTasks;
use shared::admin_service::{AdminService, AdminStatus};
use shared::http::run_http_service;
use shared::metrics_defs::MetricDef;
use std::future::IntoFuture;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use survey_client::SurveyPlatform;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum IntakeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Every metric emitted by the service, including the upstream client's.
pub fn all_metrics() -> Vec<MetricDef> {
    metrics_defs::ALL_METRICS
        .iter()
        .chain(survey_client::metrics_defs::ALL_METRICS)
        .copied()
        .collect()
}

/// Serves the API and the admin listener until a shutdown signal arrives, then
/// gives detached work up to the configured grace period to finish.
pub async fn run(config: Config, platform: Arc<dyn SurveyPlatform>) -> Result<(), IntakeError> {
    config.validate()?;

    let tasks = DetachedTasks::new();
    let orchestrator = Orchestrator::new(platform.clone(), tasks.clone(), &config.invite)?;
    let app = api::router(AppState::new(platform, orchestrator));

    let ready = Arc::new(AtomicBool::new(false));
    let admin = {
        let ready = ready.clone();
        let tasks = tasks.clone();
        AdminService::new(
            move || AdminStatus {
                ready: ready.load(Ordering::Relaxed),
                detached_tasks: tasks.inflight(),
            },
            all_metrics(),
        )
    };
    let admin_task = run_http_service::<_, _, IntakeError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin,
    );

    let listener = TcpListener::bind(format!(
        "{}:{}",
        config.listener.host, config.listener.port
    ))
    .await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "listening"
    );
    ready.store(true, Ordering::Relaxed);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(stop_accepting(shutdown_signal(), ready.clone()))
        .into_future();

    tokio::select! {
        res = server => res?,
        res = admin_task => res?,
    }

    ready.store(false, Ordering::Relaxed);

    let abandoned = tasks.drain(config.shutdown_grace()).await;
    tracing::info!(abandoned, "shut down");
    Ok(())
}

/// Resolves with `signal`, reporting not-ready before in-flight requests are drained.
async fn stop_accepting<F>(signal: F, ready: Arc<AtomicBool>)
where
    F: Future<Output = ()>,
{
    signal.await;
    ready.store(false, Ordering::Relaxed);
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}
