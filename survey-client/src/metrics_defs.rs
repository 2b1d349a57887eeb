//! Metrics definitions for the survey platform client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Upstream call duration in seconds. Tagged with operation, status.",
};

pub const UPSTREAM_ERRORS: MetricDef = MetricDef {
    name: "upstream.errors",
    metric_type: MetricType::Counter,
    description: "Upstream calls that failed. Tagged with operation.",
};

pub const RESPONSE_FETCH_RETRIES: MetricDef = MetricDef {
    name: "upstream.response_fetch.retries",
    metric_type: MetricType::Counter,
    description: "Survey response fetches repeated after an empty result",
};

pub const EXPORT_POLLS: MetricDef = MetricDef {
    name: "upstream.export.polls",
    metric_type: MetricType::Counter,
    description: "Progress checks made while waiting for a response export",
};

pub const ALL_METRICS: &[MetricDef] = &[
    UPSTREAM_REQUEST_DURATION,
    UPSTREAM_ERRORS,
    RESPONSE_FETCH_RETRIES,
    EXPORT_POLLS,
];
