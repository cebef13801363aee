use clap::{Parser, Subcommand};
use std::process;
use tracing::{debug, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;
mod plan;

use commands::{PlanArgs, RunArgs, SampleConfigArgs};
use error::{exit_code, format_error};
use output::{OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "crossbench")]
#[command(about = "Crossbench - run standardized workloads against storage backends")]
#[command(version)]
#[command(long_about = "
Crossbench drives read, write, query and ledger workloads against pluggable
storage backends and reports latency percentiles, throughput and error
rates for every run.

Examples:
  crossbench list                                               # Show backends and operations
  crossbench run --operation read-parallel --param db.seedCount=100 --param concurrency=8
  crossbench run --operation write-batch --param batchSize=25 --prometheus
  crossbench sample-config --output plan.toml                   # Write a starter plan
  crossbench --format table plan plan.toml                      # Run every benchmark in a plan
")]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: OutputFormatArg,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormatArg {
    Json,
    Table,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Table => OutputFormat::Table,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single benchmark
    Run(RunArgs),

    /// Run every benchmark in a plan file
    Plan(PlanArgs),

    /// List registered backends and operation types
    List,

    /// Write a starter plan file
    SampleConfig(SampleConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    if let Err(e) = run_command(cli).await {
        eprintln!("{}", format_error(&e));
        process::exit(exit_code(&e));
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let output = OutputManager::new(cli.format.into());

    match cli.command {
        Commands::Run(args) => commands::run::run(args, output).await,
        Commands::Plan(args) => commands::plan::run(args, output).await,
        Commands::List => commands::list::run(output),
        Commands::SampleConfig(args) => commands::sample_config::run(args, output),
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("crossbench={}", level).into()
    });

    // Logs go to stderr so stdout stays machine-readable
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!(version = crossbench::VERSION, "crossbench started");
}
