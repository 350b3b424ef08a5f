use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use crate::error::{Result, UnderdogError};
use crate::tracker::{Outcome, TrackerStats};

pub mod labels {
    pub const OUTCOME: &str = "outcome";
    pub const ERROR_TYPE: &str = "error_type";
    pub const SHARD: &str = "shard";
}

pub mod values {
    pub const OUTCOME_ALLOWED: &str = "allowed";
    pub const OUTCOME_BLOCKED: &str = "blocked";
    pub const ERROR_INVALID_COMMAND: &str = "invalid_command";
    pub const ERROR_PROXY: &str = "proxy";
    pub const ERROR_INTERNAL: &str = "internal";
}

#[derive(Clone)]
pub struct Metrics {
    shard: KeyValue,

    pub connections_total: Counter<u64>,
    pub queries_total: Counter<u64>,
    pub proxied_total: Counter<u64>,
    pub errors_total: Counter<u64>,

    pub expired_total: Counter<u64>,
    pub evicted_records: Gauge<u64>,
    pub active_records: Gauge<u64>,
    pub free_slots: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter, shard: u16) -> Self {
        Self {
            shard: KeyValue::new(labels::SHARD, i64::from(shard)),

            connections_total: meter
                .u64_counter("underdog_connections_total")
                .with_description("Total number of client connections accepted")
                .build(),
            queries_total: meter
                .u64_counter("underdog_queries_total")
                .with_description("Digests checked against this shard's tracker")
                .build(),
            proxied_total: meter
                .u64_counter("underdog_proxied_total")
                .with_description("Digests forwarded to the owning shard")
                .build(),
            errors_total: meter
                .u64_counter("underdog_errors_total")
                .with_description("Requests answered with ERROR")
                .build(),

            expired_total: meter
                .u64_counter("underdog_expired_total")
                .with_description("Records released by the expiry sweep")
                .build(),
            evicted_records: meter
                .u64_gauge("underdog_evicted_records")
                .with_description("Unexpired records evicted to make room for new digests since startup")
                .build(),
            active_records: meter
                .u64_gauge("underdog_active_records")
                .with_description("Digests currently tracked")
                .build(),
            free_slots: meter
                .u64_gauge("underdog_free_slots")
                .with_description("Unused record slots")
                .build(),
        }
    }

    pub fn record_connection(&self) {
        self.connections_total.add(1, &[self.shard.clone()]);
    }

    pub fn record_query(&self, outcome: &Outcome) {
        let value = match outcome {
            Outcome::Allowed { .. } => values::OUTCOME_ALLOWED,
            Outcome::Blocked { .. } => values::OUTCOME_BLOCKED,
        };
        self.queries_total
            .add(1, &[self.shard.clone(), KeyValue::new(labels::OUTCOME, value)]);
    }

    pub fn record_proxied(&self) {
        self.proxied_total.add(1, &[self.shard.clone()]);
    }

    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total
            .add(1, &[self.shard.clone(), KeyValue::new(labels::ERROR_TYPE, error_type)]);
    }

    pub fn record_expired(&self, released: usize) {
        if released > 0 {
            self.expired_total.add(released as u64, &[self.shard.clone()]);
        }
    }

    pub fn record_tracker(&self, stats: &TrackerStats) {
        let attrs = [self.shard.clone()];
        self.active_records.record(stats.active as u64, &attrs);
        self.free_slots.record(stats.free as u64, &attrs);
        self.evicted_records.record(stats.evicted, &attrs);
    }
}

pub fn init_metrics(shard: u16) -> Result<(Arc<Metrics>, Registry)> {
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|e| UnderdogError::Telemetry(format!("Failed to build exporter: {e}")))?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("underdog");
    let metrics = Arc::new(Metrics::new(meter, shard));

    Ok((metrics, registry))
}
