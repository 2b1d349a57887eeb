use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_statsd_port() -> u16 {
    8125
}

pub fn default_prefix() -> String {
    "qualtrix".into()
}

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("could not install metrics recorder: {0}")]
    Install(String),
}

/// Installs the statsd recorder and describes every known metric. Without a
/// statsd host the `metrics` facade stays a no-op.
pub fn init(config: Option<&MetricsConfig>) -> Result<(), MetricsError> {
    let Some(config) = config else {
        tracing::info!("statsd not configured, metrics are discarded");
        return Ok(());
    };

    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(&config.prefix))?;
    ::metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

    shared::metrics_defs::describe_all(&intake::all_metrics());
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}
