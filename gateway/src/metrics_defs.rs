use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "gateway.request.duration",
    metric_type: MetricType::Histogram,
    description: "Proxied request duration in seconds. Tagged with status, tenant.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "gateway.requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const UNKNOWN_TENANT: MetricDef = MetricDef {
    name: "gateway.unknown_tenant",
    metric_type: MetricType::Counter,
    description: "Requests rejected because the tenant is not in the directory",
};

pub const UPSTREAM_ERRORS: MetricDef = MetricDef {
    name: "gateway.upstream.errors",
    metric_type: MetricType::Counter,
    description: "Upstream exchanges that failed before a response was relayed. Tagged with tenant.",
};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "gateway.cache.hit",
    metric_type: MetricType::Counter,
    description: "Cacheable requests served from the response cache. Tagged with tenant.",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "gateway.cache.miss",
    metric_type: MetricType::Counter,
    description: "Cacheable requests forwarded to the upstream. Tagged with tenant.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    UNKNOWN_TENANT,
    UPSTREAM_ERRORS,
    CACHE_HIT,
    CACHE_MISS,
];
