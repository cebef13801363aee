//! Prometheus text exposition of finalized runs

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{HarnessError, Result};
use crate::metrics::summary::keys;
use crate::metrics::BenchmarkRun;

const LABELS: &[&str] = &["run", "backend"];

fn export_error(e: prometheus::Error) -> HarnessError {
    HarnessError::Export {
        reason: e.to_string(),
    }
}

/// Renders run summaries as Prometheus gauges labelled by run and backend
pub struct PrometheusExporter {
    registry: Registry,
    operations: GaugeVec,
    success_rate: GaugeVec,
    throughput_items: GaugeVec,
    throughput_bytes: GaugeVec,
    average_duration: GaugeVec,
    latency: GaugeVec,
    errors: IntCounterVec,
    cold_starts: IntCounterVec,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("crossbench".to_string()), None).map_err(export_error)?;

        let gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), LABELS).map_err(export_error)?;
            registry.register(Box::new(vec.clone())).map_err(export_error)?;
            Ok(vec)
        };
        let operations = gauge("run_operations", "Operations measured in the run")?;
        let success_rate = gauge("run_success_rate", "Fraction of successful operations")?;
        let throughput_items = gauge("run_throughput_items_per_second", "Items per second of run time")?;
        let throughput_bytes = gauge("run_throughput_bytes_per_second", "Bytes per second of run time")?;
        let average_duration = gauge("run_average_duration_seconds", "Mean operation duration")?;

        let latency = GaugeVec::new(
            Opts::new("run_latency_seconds", "Nearest-rank operation latency percentiles"),
            &["run", "backend", "quantile"],
        )
        .map_err(export_error)?;
        registry.register(Box::new(latency.clone())).map_err(export_error)?;

        let counter = |name: &str, help: &str| -> Result<IntCounterVec> {
            let vec = IntCounterVec::new(Opts::new(name, help), LABELS).map_err(export_error)?;
            registry.register(Box::new(vec.clone())).map_err(export_error)?;
            Ok(vec)
        };
        let errors = counter("run_errors_total", "Failed operations in the run")?;
        let cold_starts = counter("run_cold_starts_total", "Cold-start operations in the run")?;

        Ok(Self {
            registry,
            operations,
            success_rate,
            throughput_items,
            throughput_bytes,
            average_duration,
            latency,
            errors,
            cold_starts,
        })
    }

    /// Publish the summary of a finalized run. Runs that have not been
    /// ended carry no summary and are skipped.
    pub fn observe(&self, run: &BenchmarkRun) {
        if !run.is_finalized() {
            tracing::debug!(run = %run.name, "skipping export of unfinished run");
            return;
        }
        let labels = [run.name.as_str(), run.backend.as_str()];
        let f = |key: &str| run.summary_f64(key).unwrap_or(0.0);
        let secs = |key: &str| run.summary_u64(key).unwrap_or(0) as f64 / 1e9;

        self.operations
            .with_label_values(&labels)
            .set(f(keys::OPERATION_COUNT));
        self.success_rate
            .with_label_values(&labels)
            .set(f(keys::SUCCESS_RATE));
        self.throughput_items
            .with_label_values(&labels)
            .set(f(keys::THROUGHPUT_ITEMS));
        self.throughput_bytes
            .with_label_values(&labels)
            .set(f(keys::THROUGHPUT_BYTES));
        self.average_duration
            .with_label_values(&labels)
            .set(secs(keys::AVERAGE_DURATION));

        for (key, quantile) in [(keys::P50, "0.5"), (keys::P90, "0.9"), (keys::P99, "0.99")] {
            if run.summary.contains_key(key) {
                self.latency
                    .with_label_values(&[labels[0], labels[1], quantile])
                    .set(secs(key));
            }
        }

        self.errors
            .with_label_values(&labels)
            .inc_by(run.summary_u64(keys::ERROR_COUNT).unwrap_or(0));
        self.cold_starts
            .with_label_values(&labels)
            .inc_by(run.summary_u64(keys::COLD_START_COUNT).unwrap_or(0));
    }

    /// Text exposition of everything observed so far.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(export_error)?;
        String::from_utf8(buffer).map_err(|e| HarnessError::Export {
            reason: e.to_string(),
        })
    }
}
