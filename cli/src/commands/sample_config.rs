use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::output::OutputManager;
use crate::plan::PlanConfig;

#[derive(Args, Debug)]
pub struct SampleConfigArgs {
    /// Write the plan here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(args: SampleConfigArgs, output: OutputManager) -> anyhow::Result<()> {
    let plan = PlanConfig::sample();
    match args.output {
        Some(path) => {
            plan.save_to_file(&path)?;
            info!(path = %path.display(), "sample plan written");
        }
        None => output.print_raw(&plan.to_toml()?)?,
    }
    Ok(())
}
