use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Tunnel request duration in seconds, including the upstream call. Tagged with status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of tunnel requests currently being processed",
};

pub const ENVELOPES_FORWARDED: MetricDef = MetricDef {
    name: "envelopes.forwarded",
    metric_type: MetricType::Counter,
    description: "Envelopes sent upstream. Tagged with outcome: accepted, rejected or failed.",
};

pub const REQUESTS_REJECTED: MetricDef = MetricDef {
    name: "requests.rejected",
    metric_type: MetricType::Counter,
    description: "Tunnel requests that ended in an error. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    ENVELOPES_FORWARDED,
    REQUESTS_REJECTED,
];
