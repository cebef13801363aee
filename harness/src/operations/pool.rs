//! Bounded fan-out for per-item and per-batch storage work

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

/// Completed task: its position in the input and its output, or the panic
/// message if the task panicked.
pub type TaskOutcome<T> = (usize, Result<T, String>);

/// Run `tasks` with at most `concurrency` of them in flight.
///
/// Tasks start in input order; a new one starts whenever a running one
/// finishes. Outcomes are returned in completion order, one per task. A
/// panicking task is reported as an `Err` outcome and does not affect its
/// siblings.
pub async fn run_bounded<I, F, T>(tasks: I, concurrency: usize) -> Vec<TaskOutcome<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut outcomes = Vec::with_capacity(pending.size_hint().0);

    let spawn = |(index, task): (usize, F)| {
        AssertUnwindSafe(task)
            .catch_unwind()
            .map(move |result| (index, result.map_err(panic_message)))
    };

    // Initial fill; never more workers than tasks
    for entry in pending.by_ref().take(concurrency.max(1)) {
        in_flight.push(spawn(entry));
    }

    while let Some(outcome) = in_flight.next().await {
        outcomes.push(outcome);
        if let Some(entry) = pending.next() {
            in_flight.push(spawn(entry));
        }
    }

    outcomes
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}
