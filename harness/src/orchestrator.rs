//! Request-level glue: backend + operation + collector for one benchmark
//!
//! The orchestrator never fails a request by returning an error; every
//! problem is reported in the [`BenchmarkResponse`]. The run it starts is
//! always ended, so the collector is never left with a dangling current run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::OperationError;
use crate::metrics::{BenchmarkRun, Collector, RunSpec};
use crate::operations::{OperationFactory, OperationResult};
use crate::params::{ParamMap, ParamValue};
use crate::storage::{BackendRegistry, RequestContext, Storage};

/// Prefix marking a parameter as backend configuration
pub const BACKEND_PARAM_PREFIX: &str = "db.";

/// One benchmark invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRequest {
    #[serde(alias = "databaseType")]
    pub backend: String,
    #[serde(alias = "operationType")]
    pub operation: String,
    #[serde(default)]
    pub parameters: ParamMap,
}

impl BenchmarkRequest {
    pub fn new(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            operation: operation.into(),
            parameters: ParamMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of one benchmark invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResponse {
    pub operation_type: String,
    pub backend: String,
    pub run_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub items_processed: usize,
    pub total_duration_ns: u64,
    pub avg_operation_duration_ns: u64,
    /// Successful items per second of operation time
    pub throughput: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamp: DateTime<Utc>,
}

impl BenchmarkResponse {
    fn new(request: &BenchmarkRequest, run_name: &str) -> Self {
        Self {
            operation_type: request.operation.clone(),
            backend: request.backend.clone(),
            run_name: run_name.to_string(),
            success: false,
            error_message: None,
            items_processed: 0,
            total_duration_ns: 0,
            avg_operation_duration_ns: 0,
            throughput: 0.0,
            metrics: None,
            timestamp: Utc::now(),
        }
    }

    fn fail(mut self, message: String) -> Self {
        error!(run = %self.run_name, "{}", message);
        self.error_message = Some(message);
        self
    }

    fn apply_result(&mut self, result: &OperationResult) {
        let nanos = u64::try_from(result.total_duration.as_nanos()).unwrap_or(u64::MAX);
        self.items_processed = result.items_processed;
        self.total_duration_ns = nanos;
        if result.items_processed > 0 {
            self.avg_operation_duration_ns = nanos / result.items_processed as u64;
            let secs = result.total_duration.as_secs_f64();
            if secs > 0.0 {
                self.throughput = result.items_processed as f64 / secs;
            }
        }
    }
}

/// Split request parameters into backend configuration (`db.` keys, with
/// the prefix stripped) and operation parameters.
pub fn split_parameters(parameters: &ParamMap) -> (ParamMap, ParamMap) {
    let mut backend = ParamMap::new();
    let mut operation = ParamMap::new();
    for (key, value) in parameters {
        match key.strip_prefix(BACKEND_PARAM_PREFIX) {
            Some(stripped) => backend.insert(stripped.to_string(), value.clone()),
            None => operation.insert(key.clone(), value.clone()),
        };
    }
    (backend, operation)
}

/// Fill in the request-level defaults that are not already set.
fn with_defaults(mut parameters: ParamMap) -> ParamMap {
    let defaults: [(&str, ParamValue); 4] = [
        ("concurrency", ParamValue::Integer(10)),
        ("itemCount", ParamValue::Integer(100)),
        ("dataSize", ParamValue::Integer(1024)),
        ("consistentRead", ParamValue::Boolean(true)),
    ];
    for (key, value) in defaults {
        parameters.entry(key.to_string()).or_insert(value);
    }
    parameters
}

/// Runs benchmark requests against backends from a [`BackendRegistry`]
pub struct Orchestrator {
    collector: Arc<Collector>,
    backends: BackendRegistry,
    operations: OperationFactory,
    cold_start: AtomicBool,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_registries(BackendRegistry::default(), OperationFactory::new())
    }

    pub fn with_registries(backends: BackendRegistry, operations: OperationFactory) -> Self {
        Self {
            collector: Arc::new(Collector::new()),
            backends,
            operations,
            cold_start: AtomicBool::new(true),
        }
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn operations(&self) -> &OperationFactory {
        &self.operations
    }

    /// Finalized run behind a response, if it is still stored.
    pub fn run(&self, response: &BenchmarkResponse) -> Option<BenchmarkRun> {
        self.collector.get_test_result(&response.run_name)
    }

    pub async fn handle(&self, ctx: &RequestContext, request: BenchmarkRequest) -> BenchmarkResponse {
        let run_name = format!(
            "{}-{}-{}",
            request.backend,
            request.operation,
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        let response = BenchmarkResponse::new(&request, &run_name);
        info!(
            run = %run_name,
            backend = %request.backend,
            operation = %request.operation,
            "benchmark requested"
        );

        let (backend_config, operation_params) = split_parameters(&request.parameters);
        let collect_metrics = operation_params
            .get("collectMetrics")
            .and_then(ParamValue::as_bool)
            .unwrap_or(true);

        let is_cold_start = self.cold_start.swap(false, Ordering::SeqCst);
        let mut operation_params = with_defaults(operation_params);
        operation_params.insert("isColdStart".to_string(), ParamValue::Boolean(is_cold_start));

        let operation = match self.operations.create(&request.operation, &operation_params) {
            Ok(operation) => operation,
            Err(e) => return response.fail(format!("Failed to create operation strategy: {}", e)),
        };

        let backend = match self.backends.create(&request.backend, &backend_config) {
            Ok(backend) => backend,
            Err(e) => return response.fail(format!("Failed to create database adapter: {}", e)),
        };

        let spec = RunSpec::new(run_name.as_str())
            .description(format!("{} operations on {}", request.operation, request.backend))
            .backend(request.backend.as_str())
            .config(backend_config)
            .parameters(request.parameters.clone());
        if let Err(e) = self.collector.start_test(spec) {
            return response.fail(format!("Failed to start test: {}", e));
        }

        let response = self
            .execute(ctx, backend, operation.as_ref(), response, collect_metrics)
            .await;
        info!(run = %run_name, success = response.success, items = response.items_processed, "benchmark finished");
        response
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        operation: &dyn crate::operations::Operation,
        mut response: BenchmarkResponse,
        collect_metrics: bool,
    ) -> BenchmarkResponse {
        let outcome = match backend.initialize(ctx).await {
            Ok(()) => Some(
                operation
                    .execute(ctx, Arc::clone(&backend), &self.collector)
                    .await,
            ),
            Err(e) => {
                response.error_message = Some(format!("Error initializing database: {}", e));
                None
            }
        };

        if let Err(e) = backend.close().await {
            warn!(run = %response.run_name, error = %e, "backend close failed");
        }

        match self.collector.end_test(&response.run_name) {
            Ok(run) if collect_metrics => response.metrics = Some(run.summary),
            Ok(_) => {}
            Err(e) => warn!(run = %response.run_name, error = %e, "could not end test"),
        }

        match outcome {
            Some(Ok(result)) => {
                response.apply_result(&result);
                response.success = true;
                response
            }
            Some(Err(e)) => {
                if let OperationError::AllFailed { result, .. } = &e {
                    response.apply_result(result);
                }
                response.fail(format!("Operation execution failed: {}", e))
            }
            None => {
                let message = response.error_message.take().unwrap_or_default();
                response.fail(message)
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
