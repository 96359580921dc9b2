use std::sync::Arc;

use opentelemetry::metrics::{Counter, MetricsError};
use prometheus::Registry;
use snafu::{ResultExt, Snafu};

use crate::header_policy_store::AuditedHeadersStore;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Failed to register metrics callback"))]
    RegisterMetricsCallback { source: MetricsError },
}

pub struct Metrics {
    pub registry: Registry,
    pub http_counter: Counter<u64>,
    pub audited_requests: Counter<u64>,
    pub header_policy_changes: Counter<u64>,
}

impl Metrics {
    pub fn new(registry: Registry, store: Arc<AuditedHeadersStore>) -> Result<Self, Error> {
        let meter = opentelemetry::global::meter("audit-headers");

        let http_counter = meter
            .u64_counter("http_requests_total")
            .with_description("Total number of HTTP requests made.")
            .init();

        let audited_requests = meter
            .u64_counter("audited_requests_total")
            .with_description("Total number of requests an audit entry was written for.")
            .init();

        let header_policy_changes = meter
            .u64_counter("header_policy_changes_total")
            .with_description("Total number of successful changes to the audited headers.")
            .init();

        let audited_headers_metric = meter
            .u64_observable_gauge("audited_headers")
            .with_description("The number of configured audited headers by their hashing policy")
            .init();

        // Taking a snapshot never blocks, so it is safe to do from within the metrics callback
        meter
            .register_callback(&[audited_headers_metric.as_any()], move |observer| {
                let policies = store.snapshot();
                let hashed = policies.iter().filter(|(_, policy)| policy.hmac).count() as u64;
                let plain = policies.len() as u64 - hashed;

                observer.observe_u64(
                    &audited_headers_metric,
                    hashed,
                    &[opentelemetry::KeyValue::new("hmac", true)],
                );
                observer.observe_u64(
                    &audited_headers_metric,
                    plain,
                    &[opentelemetry::KeyValue::new("hmac", false)],
                );
            })
            .context(RegisterMetricsCallbackSnafu)?;

        Ok(Self {
            registry,
            http_counter,
            audited_requests,
            header_policy_changes,
        })
    }
}
