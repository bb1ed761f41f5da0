//! Prometheus metrics for the event pipeline
//!
//! Components only increment or set these; they are read back solely by the
//! `/metrics` exposition endpoint.

use prometheus::{Encoder, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Event ingestion and ordering
pub mod sequencer {
    use super::REGISTRY;
    use prometheus::{register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge};

    /// Records admitted from the event source
    pub static MESSAGES_RECEIVED: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "messages_received_total",
            "Total number of event records received from the event source",
            REGISTRY.clone()
        ).expect("Failed to register MESSAGES_RECEIVED")
    });

    /// Records released in sequence order
    pub static MESSAGES_DISPATCHED: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "messages_dispatched_total",
            "Total number of event records dispatched in sequence order",
            REGISTRY.clone()
        ).expect("Failed to register MESSAGES_DISPATCHED")
    });

    /// Records currently held waiting for a missing predecessor
    pub static PENDING_MESSAGES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "pending_messages",
            "Current number of out-of-order records held for later dispatch",
            REGISTRY.clone()
        ).expect("Failed to register PENDING_MESSAGES")
    });

    /// Records that failed to decode
    pub static MALFORMED_MESSAGES: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "malformed_messages_total",
            "Total number of event records rejected as malformed",
            REGISTRY.clone()
        ).expect("Failed to register MALFORMED_MESSAGES")
    });

    /// Records whose sequence number was already dispatched
    pub static STALE_MESSAGES: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "stale_messages_total",
            "Total number of event records dropped because their sequence number was already dispatched",
            REGISTRY.clone()
        ).expect("Failed to register STALE_MESSAGES")
    });

    /// Records whose sequence number was already waiting in the buffer
    pub static DUPLICATE_MESSAGES: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "duplicate_messages_total",
            "Total number of event records dropped because their sequence number was already buffered",
            REGISTRY.clone()
        ).expect("Failed to register DUPLICATE_MESSAGES")
    });
}

/// Client fan-out
pub mod delivery {
    use super::REGISTRY;
    use prometheus::{
        register_int_counter_vec_with_registry, register_int_counter_with_registry,
        register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge,
    };

    /// Lines queued to a client
    pub static DELIVERIES: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "deliveries_total",
            "Total number of lines queued to client connections",
            REGISTRY.clone()
        ).expect("Failed to register DELIVERIES")
    });

    /// Lines a registered client did not get
    pub static DELIVERY_DROPS: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "delivery_drops_total",
            "Total number of lines dropped for a registered client",
            &["reason"],
            REGISTRY.clone()
        ).expect("Failed to register DELIVERY_DROPS")
    });

    /// Registered clients
    pub static CONNECTED_CLIENTS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "connected_clients",
            "Current number of registered client connections",
            REGISTRY.clone()
        ).expect("Failed to register CONNECTED_CLIENTS")
    });

    /// Event source sessions started
    pub static SOURCE_SESSIONS: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "event_source_sessions_total",
            "Total number of event source sessions accepted",
            REGISTRY.clone()
        ).expect("Failed to register SOURCE_SESSIONS")
    });
}

/// Helper macro to record a dropped delivery
#[macro_export]
macro_rules! record_delivery_drop {
    ($reason:expr) => {
        $crate::metrics::delivery::DELIVERY_DROPS
            .with_label_values(&[$reason])
            .inc();
    };
}

/// Expose metrics in Prometheus format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
