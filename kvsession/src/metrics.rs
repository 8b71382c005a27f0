//! Prometheus metrics for a session.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Counters and gauges updated by one session.
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    /// Point reads served, found or not.
    pub reads: Counter,

    /// Atomic writes applied, including single puts and deletes.
    pub writes: Counter,

    /// Operations applied across all writes.
    pub write_ops: Counter,

    /// Snapshots created and not yet released.
    pub open_snapshots: Gauge,

    /// Iterators created and not yet released.
    pub open_iterators: Gauge,
}

impl SessionMetrics {
    /// Creates the metrics and registers them into `registry`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();

        registry.register(
            "kv_reads",
            "Total number of point reads",
            metrics.reads.clone(),
        );
        registry.register(
            "kv_writes",
            "Total number of atomic writes",
            metrics.writes.clone(),
        );
        registry.register(
            "kv_write_ops",
            "Total number of operations applied by writes",
            metrics.write_ops.clone(),
        );
        registry.register(
            "kv_open_snapshots",
            "Number of unreleased snapshots",
            metrics.open_snapshots.clone(),
        );
        registry.register(
            "kv_open_iterators",
            "Number of unreleased iterators",
            metrics.open_iterators.clone(),
        );

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_register_session_metrics() {
        // given
        let mut registry = Registry::default();

        // when
        let metrics = SessionMetrics::register(&mut registry);
        metrics.writes.inc();
        metrics.open_iterators.inc();

        // then
        let mut encoded = String::new();
        prometheus_client::encoding::text::encode(&mut encoded, &registry).unwrap();
        assert!(encoded.contains("# HELP kv_reads"));
        assert!(encoded.contains("# HELP kv_write_ops"));
        assert!(encoded.contains("kv_open_iterators 1"));
    }
}
