//! Benchmark plan files
//!
//! A plan is a TOML file listing benchmarks plus run-wide settings. The
//! settings table can be overridden from the environment with
//! `CROSSBENCH_` variables, e.g. `CROSSBENCH_REPETITIONS=3`.

use std::fs;
use std::path::Path;

use config::{Config, Environment};
use crossbench::{BenchmarkRequest, ParamMap, ParamValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CliError, Result};

const ENV_PREFIX: &str = "CROSSBENCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    #[serde(default)]
    pub settings: PlanSettings,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkSpec>,
}

/// Run-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    /// How many times each benchmark is executed
    pub repetitions: u32,
    /// Backend used by benchmarks that do not name one
    pub default_backend: String,
    /// Attach the collector summary to every response
    pub collect_metrics: bool,
    /// Per-request deadline in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            repetitions: 1,
            default_backend: "memory".to_string(),
            collect_metrics: true,
            timeout_secs: None,
        }
    }
}

/// One benchmark entry in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub parameters: ParamMap,
}

impl BenchmarkSpec {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.operation)
    }

    /// Request for this benchmark, falling back to the plan's settings.
    pub fn to_request(&self, settings: &PlanSettings) -> BenchmarkRequest {
        let backend = self
            .backend
            .clone()
            .unwrap_or_else(|| settings.default_backend.clone());
        let mut request = BenchmarkRequest::new(backend, self.operation.as_str());
        request.parameters = self.parameters.clone();
        request
            .parameters
            .entry("collectMetrics".to_string())
            .or_insert(ParamValue::Boolean(settings.collect_metrics));
        request
    }
}

impl PlanConfig {
    /// Load a plan file and apply `CROSSBENCH_*` overrides to its settings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CliError::PlanNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path)?;
        let mut plan: PlanConfig =
            toml::from_str(&content).map_err(|e| CliError::InvalidPlan(e.to_string()))?;
        plan.settings = plan.settings.with_env_overrides()?;
        plan.validate()?;

        info!(
            path = %path.display(),
            benchmarks = plan.benchmarks.len(),
            repetitions = plan.settings.repetitions,
            "loaded plan"
        );
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.settings.repetitions == 0 {
            return Err(CliError::InvalidPlan(
                "settings.repetitions must be at least 1".to_string(),
            ));
        }
        if self.benchmarks.is_empty() {
            return Err(CliError::InvalidPlan("plan lists no benchmarks".to_string()));
        }
        if matches!(self.settings.timeout_secs, Some(0)) {
            return Err(CliError::InvalidPlan(
                "settings.timeout_secs must be positive".to_string(),
            ));
        }
        for (index, benchmark) in self.benchmarks.iter().enumerate() {
            if benchmark.operation.trim().is_empty() {
                return Err(CliError::InvalidPlan(format!(
                    "benchmark {} has no operation",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Starter plan covering the read, write and query workloads.
    pub fn sample() -> Self {
        let seeded = |extra: &[(&str, ParamValue)]| -> ParamMap {
            let mut params: ParamMap = [
                ("itemCount", ParamValue::Integer(100)),
                ("dataSize", ParamValue::Integer(1024)),
                ("db.seedCount", ParamValue::Integer(100)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
            params
        };

        Self {
            settings: PlanSettings::default(),
            benchmarks: vec![
                BenchmarkSpec {
                    name: Some("sequential reads".to_string()),
                    backend: None,
                    operation: "read-sequential".to_string(),
                    parameters: seeded(&[]),
                },
                BenchmarkSpec {
                    name: Some("parallel reads".to_string()),
                    backend: None,
                    operation: "read-parallel".to_string(),
                    parameters: seeded(&[("concurrency", ParamValue::Integer(8))]),
                },
                BenchmarkSpec {
                    name: Some("batched writes".to_string()),
                    backend: None,
                    operation: "write-batch".to_string(),
                    parameters: seeded(&[("batchSize", ParamValue::Integer(25))]),
                },
                BenchmarkSpec {
                    name: Some("time range query".to_string()),
                    backend: None,
                    operation: "query".to_string(),
                    parameters: seeded(&[("limit", ParamValue::Integer(50))]),
                },
            ],
        }
    }

    /// Save the plan as TOML, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl PlanSettings {
    fn with_env_overrides(self) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("repetitions", i64::from(self.repetitions))?
            .set_default("default_backend", self.default_backend.clone())?
            .set_default("collect_metrics", self.collect_metrics)?;
        if let Some(timeout) = self.timeout_secs {
            builder = builder.set_default("timeout_secs", i64::try_from(timeout).unwrap_or(i64::MAX))?;
        }

        let settings: PlanSettings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        if settings != self {
            debug!(?settings, "plan settings overridden from environment");
        }
        Ok(settings)
    }
}
