//! Metrics definitions for the intake service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with endpoint, status.",
};

pub const INVITE_WORKFLOW_DURATION: MetricDef = MetricDef {
    name: "invite.duration",
    metric_type: MetricType::Histogram,
    description: "Time from contact creation to link resolution in seconds",
};

pub const DETACHED_TASKS_INFLIGHT: MetricDef = MetricDef {
    name: "detached_tasks.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of detached tasks still running",
};

pub const DETACHED_TASKS_FAILED: MetricDef = MetricDef {
    name: "detached_tasks.failed",
    metric_type: MetricType::Counter,
    description: "Detached tasks that returned an error or panicked. Tagged with task.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    INVITE_WORKFLOW_DURATION,
    DETACHED_TASKS_INFLIGHT,
    DETACHED_TASKS_FAILED,
];
