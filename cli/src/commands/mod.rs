pub mod list;
pub mod plan;
pub mod run;
pub mod sample_config;

pub use plan::PlanArgs;
pub use run::RunArgs;
pub use sample_config::SampleConfigArgs;

use std::time::Duration;

use crossbench::{BenchmarkResponse, Orchestrator, PrometheusExporter, RequestContext};
use tracing::warn;

use crate::error::Result;

/// Request context cancelled on Ctrl-C, with an optional deadline.
pub(crate) fn request_context(timeout: Option<Duration>) -> RequestContext {
    let ctx = match timeout {
        Some(timeout) => RequestContext::with_timeout(timeout),
        None => RequestContext::new(),
    };
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight requests");
            signal_ctx.cancel();
        }
    });
    ctx
}

/// Prometheus exposition for the runs behind `responses`.
pub(crate) fn render_prometheus<'a, I>(orchestrator: &Orchestrator, responses: I) -> Result<String>
where
    I: IntoIterator<Item = &'a BenchmarkResponse>,
{
    let exporter = PrometheusExporter::new()?;
    for response in responses {
        if let Some(run) = orchestrator.run(response) {
            exporter.observe(&run);
        }
    }
    Ok(exporter.render()?)
}
