use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use crossbench::Orchestrator;
use tracing::{info, warn};

use crate::commands::{render_prometheus, request_context};
use crate::error::CliError;
use crate::output::{LabelledResponse, OutputManager};
use crate::plan::PlanConfig;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Plan file (TOML)
    pub file: PathBuf,

    /// Override the plan's repetition count
    #[arg(long, short)]
    pub repetitions: Option<u32>,

    /// Print the runs as Prometheus metrics instead of responses
    #[arg(long)]
    pub prometheus: bool,
}

pub async fn run(args: PlanArgs, output: OutputManager) -> anyhow::Result<()> {
    let mut plan = PlanConfig::load(&args.file)
        .with_context(|| format!("could not load plan {}", args.file.display()))?;
    if let Some(repetitions) = args.repetitions {
        plan.settings.repetitions = repetitions;
        plan.validate()?;
    }

    // One orchestrator per plan, so only the very first request is cold
    let orchestrator = Orchestrator::new();
    let ctx = request_context(None);
    let timeout = plan.settings.timeout_secs.map(Duration::from_secs);

    let mut results = Vec::with_capacity(plan.benchmarks.len() * plan.settings.repetitions as usize);
    for repetition in 1..=plan.settings.repetitions {
        for benchmark in &plan.benchmarks {
            if ctx.is_cancelled() {
                warn!("plan interrupted");
                break;
            }
            let request = benchmark.to_request(&plan.settings);
            let request_ctx = match timeout {
                Some(timeout) => ctx.child_with_timeout(timeout),
                None => ctx.child(),
            };
            let response = orchestrator.handle(&request_ctx, request).await;
            info!(
                benchmark = benchmark.label(),
                repetition,
                success = response.success,
                items = response.items_processed,
                "benchmark complete"
            );
            results.push(LabelledResponse {
                benchmark: benchmark.label().to_string(),
                repetition,
                response,
            });
        }
    }

    if args.prometheus {
        let text = render_prometheus(&orchestrator, results.iter().map(|r| &r.response))?;
        output.print_raw(&text)?;
    } else {
        output.print_plan_results(&results)?;
    }

    let failed = results.iter().filter(|r| !r.response.success).count();
    let total = plan.benchmarks.len() * plan.settings.repetitions as usize;
    if failed > 0 || results.len() < total {
        return Err(CliError::BenchmarksFailed {
            failed: failed + (total - results.len()),
            total,
        }
        .into());
    }
    Ok(())
}
