//! # Prometheus Metrics
//!
//! Exposes the vault's books and event flow for scraping at `/metrics` on
//! the metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] prefixed
//! `tidepool_`, so nothing collides with the default global registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use tidepool_protocol::vault::VaultStatus;

/// Metric handles for the node. Handles are internally reference-counted,
/// so clones record into the same series.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    /// Vault events observed, by kind.
    pub events_total: IntCounterVec,
    /// Calls rejected by the gateway, by endpoint.
    pub rejected_calls_total: IntCounterVec,
    /// Faucet mints served.
    pub faucet_mints_total: IntCounter,
    /// Total value under management.
    pub total_value: IntGauge,
    /// Units outstanding.
    pub total_units: IntGauge,
    /// Asset held directly by the vault.
    pub on_hand: IntGauge,
    /// On-hand asset earmarked for claims.
    pub claim_reserve: IntGauge,
    /// Queue backlog not yet backed by on-hand asset.
    pub queue_deficit: IntGauge,
    /// Backlog plus buffer shortfall.
    pub withdraw_deficit: IntGauge,
    /// Requests waiting in the queue.
    pub pending_requests: IntGauge,
    /// Accounts holding units.
    pub holders: IntGauge,
    /// Handler latency for state-changing calls.
    pub call_latency_seconds: Histogram,
}

fn register<M>(registry: &Registry, metric: M) -> Result<M, prometheus::Error>
where
    M: prometheus::core::Collector + Clone + 'static,
{
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl VaultMetrics {
    /// Creates and registers every metric. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tidepool".into()), None)?;

        let events_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("vault_events_total", "Vault events observed, by kind"),
                &["kind"],
            )?,
        )?;
        let rejected_calls_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("rejected_calls_total", "Calls rejected by the vault, by endpoint"),
                &["endpoint"],
            )?,
        )?;
        let faucet_mints_total = register(
            &registry,
            IntCounter::new("faucet_mints_total", "Faucet mints served")?,
        )?;
        let total_value = register(
            &registry,
            IntGauge::new("total_value", "Total value under management")?,
        )?;
        let total_units = register(
            &registry,
            IntGauge::new("total_units", "Ownership units outstanding")?,
        )?;
        let on_hand = register(
            &registry,
            IntGauge::new("on_hand", "Asset held directly by the vault")?,
        )?;
        let claim_reserve = register(
            &registry,
            IntGauge::new("claim_reserve", "On-hand asset earmarked for claims")?,
        )?;
        let queue_deficit = register(
            &registry,
            IntGauge::new("queue_deficit", "Queued value not yet backed on hand")?,
        )?;
        let withdraw_deficit = register(
            &registry,
            IntGauge::new("withdraw_deficit", "Queue deficit plus buffer shortfall")?,
        )?;
        let pending_requests = register(
            &registry,
            IntGauge::new("pending_requests", "Withdrawal requests in the queue")?,
        )?;
        let holders = register(
            &registry,
            IntGauge::new("holders", "Accounts holding ownership units")?,
        )?;
        let call_latency_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "call_latency_seconds",
                    "Latency of state-changing API calls in seconds",
                )
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            )?,
        )?;

        Ok(Self {
            registry,
            events_total,
            rejected_calls_total,
            faucet_mints_total,
            total_value,
            total_units,
            on_hand,
            claim_reserve,
            queue_deficit,
            withdraw_deficit,
            pending_requests,
            holders,
            call_latency_seconds,
        })
    }

    /// Copies a status snapshot into the gauges.
    pub fn observe_status(&self, status: &VaultStatus) {
        self.total_value.set(gauge_value(status.total_value));
        self.total_units.set(gauge_value(status.total_units));
        self.on_hand.set(gauge_value(status.on_hand));
        self.claim_reserve.set(gauge_value(status.claim_reserve));
        self.queue_deficit.set(gauge_value(status.queue_deficit));
        self.withdraw_deficit.set(gauge_value(status.withdraw_deficit));
        self.pending_requests
            .set(gauge_value(status.pending_requests as u64));
        self.holders.set(gauge_value(status.holders as u64));
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_prefix() {
        let metrics = VaultMetrics::new().unwrap();
        metrics.events_total.with_label_values(&["deposited"]).inc();
        metrics.total_value.set(1_000);

        let text = metrics.encode().unwrap();
        assert!(text.contains("tidepool_vault_events_total{kind=\"deposited\"} 1"));
        assert!(text.contains("tidepool_total_value 1000"));
    }

    #[test]
    fn huge_values_saturate() {
        assert_eq!(gauge_value(u64::MAX), i64::MAX);
        assert_eq!(gauge_value(42), 42);
    }
}
