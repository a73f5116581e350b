//! Prometheus metrics for the Application operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `app_operator_reconcile_duration_seconds` (histogram): reconcile duration labeled by controller.
//! - `app_operator_reconcile_errors_total` (counter): reconcile errors labeled by controller and kind.
//! - `app_operator_resource_operations_total` (counter): derived resource writes labeled by kind and operation.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for operator reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "application"
    pub controller: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, e.g. "kube", "timeout", "invalid_spec"
    pub kind: String,
}

/// Labels for derived resource operations
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceLabels {
    /// Resource kind, e.g. "Deployment"
    pub kind: String,
    /// "created", "updated" or "unchanged"
    pub operation: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

/// Counter tracking reconcile errors
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking derived resource operations
pub static RESOURCE_OPERATIONS_TOTAL: Lazy<Family<ResourceLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "app_operator_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "app_operator_reconcile_errors_total",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "app_operator_resource_operations_total",
        "Derived resource operations by kind and outcome",
        RESOURCE_OPERATIONS_TOTAL.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(controller: &str, kind: &str) {
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

/// Increment the derived resource operation counter.
pub fn inc_resource_operation(kind: &str, operation: &str) {
    let labels = ResourceLabels {
        kind: kind.to_string(),
        operation: operation.to_string(),
    };
    RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_resource_operation_counter() {
        let labels = ResourceLabels {
            kind: "ConfigMap".to_string(),
            operation: "created".to_string(),
        };
        let before = RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).get();
        inc_resource_operation("ConfigMap", "created");
        assert_eq!(
            RESOURCE_OPERATIONS_TOTAL.get_or_create(&labels).get(),
            before + 1
        );
    }

    #[test]
    fn test_registry_registration() {
        inc_reconcile_error("application", "timeout");
        observe_reconcile_duration_seconds("application", 0.25);

        let mut buffer = String::new();
        encode(&mut buffer, &REGISTRY).unwrap();
        assert!(buffer.contains("app_operator_reconcile_errors_total"));
        assert!(buffer.contains("app_operator_reconcile_duration_seconds"));
    }
}
