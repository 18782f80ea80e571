use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Resolve outcomes, labelled by response code
pub static RESOLVE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("paygate_resolve_total", "Gate resolutions by outcome code"),
        &["code"],
    )
    .unwrap()
});

pub static SESSIONS_MINTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "paygate_sessions_minted_total",
        "Total number of pending sessions minted",
    )
    .unwrap()
});

pub static GATES_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "paygate_gates_registered_total",
        "Total number of gates registered",
    )
    .unwrap()
});

// Upstream metrics
pub static UPSTREAM_FETCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "paygate_upstream_fetches_total",
        "Total number of upstream fetches after unlock",
    )
    .unwrap()
});

pub static UPSTREAM_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "paygate_upstream_failures_total",
        "Upstream fetches that failed at the transport level",
    )
    .unwrap()
});

pub static UPSTREAM_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("paygate_upstream_latency_seconds", "Upstream fetch latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Later calls are no-ops.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(RESOLVE_TOTAL.clone())).unwrap();
        REGISTRY
            .register(Box::new(SESSIONS_MINTED.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(GATES_REGISTERED.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_FETCHES.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_FAILURES.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_LATENCY.clone()))
            .unwrap();
    });
}
