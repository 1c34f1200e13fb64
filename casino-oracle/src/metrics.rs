// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry, TextEncoder,
};

/// Prefix applied to every metric of the oracle registry.
pub const METRICS_PREFIX: &str = "casino";

const LATENCY_MS_BUCKETS: &[f64] = &[20., 50., 100., 200., 500.];

#[derive(Clone, Debug)]
pub struct OracleMetrics {
    registry: Registry,

    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) signidice_event_ms: Histogram,
    pub(crate) http_sign_transaction_ms: Histogram,

    pub(crate) chain_rpc_queries: IntCounterVec,
    pub(crate) chain_rpc_errors: IntCounterVec,

    pub(crate) signidice_events_received: IntCounter,
    pub(crate) signidice_events_dropped: IntCounterVec,
    pub(crate) signidice_broadcast_ok: IntCounter,
    pub(crate) signidice_broadcast_failed: IntCounter,

    pub(crate) duplicate_broadcasts: IntCounter,
    pub(crate) chain_state_cache_hits: IntCounter,
    pub(crate) chain_state_cache_misses: IntCounter,
    pub(crate) deposit_rejections: IntCounterVec,
    pub(crate) last_committed_offset: IntGauge,
}

impl OracleMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
            requests_received: register_int_counter_vec_with_registry!(
                "requests_received",
                "Total number of requests received by type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "requests_ok",
                "Total number of ok requests by type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "err_requests",
                "Total number of erred requests by type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "requests_inflight",
                "Total number of inflight requests by type",
                &["type"],
                registry,
            )
            .unwrap(),
            signidice_event_ms: register_histogram_with_registry!(
                "signidice_part_2_event_ms",
                "signidice part 2 event processing time in ms",
                LATENCY_MS_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            http_sign_transaction_ms: register_histogram_with_registry!(
                "http_sign_transaction_ms",
                "HTTP /sign_transaction query processing time in ms",
                LATENCY_MS_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            chain_rpc_queries: register_int_counter_vec_with_registry!(
                "chain_rpc_queries",
                "Total number of chain rpc queries by method",
                &["method"],
                registry,
            )
            .unwrap(),
            chain_rpc_errors: register_int_counter_vec_with_registry!(
                "chain_rpc_errors",
                "Total number of chain rpc errors by method",
                &["method"],
                registry,
            )
            .unwrap(),
            signidice_events_received: register_int_counter_with_registry!(
                "signidice_events_received",
                "Total number of signidice events received from the broker",
                registry,
            )
            .unwrap(),
            signidice_events_dropped: register_int_counter_vec_with_registry!(
                "signidice_events_dropped",
                "Total number of signidice events dropped before broadcast, by reason",
                &["reason"],
                registry,
            )
            .unwrap(),
            signidice_broadcast_ok: register_int_counter_with_registry!(
                "signidice_broadcast_ok",
                "Total number of sgdicesecond transactions accepted by the chain",
                registry,
            )
            .unwrap(),
            signidice_broadcast_failed: register_int_counter_with_registry!(
                "signidice_broadcast_failed",
                "Total number of sgdicesecond transactions that failed to broadcast",
                registry,
            )
            .unwrap(),
            duplicate_broadcasts: register_int_counter_with_registry!(
                "duplicate_broadcasts",
                "Total number of pushes answered with a duplicate transaction error",
                registry,
            )
            .unwrap(),
            chain_state_cache_hits: register_int_counter_with_registry!(
                "chain_state_cache_hits",
                "Total number of chain state lookups served from cache",
                registry,
            )
            .unwrap(),
            chain_state_cache_misses: register_int_counter_with_registry!(
                "chain_state_cache_misses",
                "Total number of chain state lookups that queried the chain",
                registry,
            )
            .unwrap(),
            deposit_rejections: register_int_counter_vec_with_registry!(
                "deposit_rejections",
                "Total number of deposit transactions rejected, by reason",
                &["reason"],
                registry,
            )
            .unwrap(),
            last_committed_offset: register_int_gauge_with_registry!(
                "last_committed_offset",
                "Last broker offset written to the checkpoint file",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }

    /// Registry with the `casino_` prefix used in production.
    pub fn new_registry() -> prometheus::Result<Registry> {
        Registry::new_custom(Some(METRICS_PREFIX.to_string()), None)
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
