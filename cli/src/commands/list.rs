use crossbench::Orchestrator;

use crate::output::{Listing, OutputManager};

pub fn run(output: OutputManager) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new();
    let listing = Listing {
        backends: orchestrator.backends().tags(),
        operations: orchestrator.operations().names(),
    };
    output.print_listing(&listing)?;
    Ok(())
}
