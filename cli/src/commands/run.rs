use std::time::Duration;

use clap::Args;
use crossbench::{BenchmarkRequest, Orchestrator, ParamValue};
use tracing::info;

use crate::commands::{render_prometheus, request_context};
use crate::error::{CliError, Result};
use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Backend type tag
    #[arg(long, short, default_value = "memory")]
    pub backend: String,

    /// Operation type (see `crossbench list`)
    #[arg(long, short)]
    pub operation: String,

    /// Operation or backend parameter; prefix backend settings with `db.`
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Print the run as Prometheus metrics instead of a response
    #[arg(long)]
    pub prometheus: bool,

    /// Request deadline in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Split `key=value`, parsing the value as bool, integer, float or text.
pub fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), ParamValue::parse_cli(value.trim())))
        }
        _ => Err(CliError::InvalidParameter {
            raw: raw.to_string(),
        }),
    }
}

pub async fn run(args: RunArgs, output: OutputManager) -> anyhow::Result<()> {
    let mut request = BenchmarkRequest::new(args.backend.as_str(), args.operation.as_str());
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        request.parameters.insert(key, value);
    }

    let orchestrator = Orchestrator::new();
    let ctx = request_context(args.timeout.map(Duration::from_secs));
    let response = orchestrator.handle(&ctx, request).await;
    info!(
        run = %response.run_name,
        success = response.success,
        items = response.items_processed,
        "run complete"
    );

    if args.prometheus {
        output.print_raw(&render_prometheus(&orchestrator, [&response])?)?;
    } else {
        output.print_response(&response)?;
    }

    if !response.success {
        return Err(CliError::BenchmarksFailed { failed: 1, total: 1 }.into());
    }
    Ok(())
}
