//! Generic fan-out primitive: "launch N tasks, collect from a channel,
//! close when all complete, abandon on deadline" (spec.md §9, Design
//! Notes — "Fan-out pattern"). Used by the scrape coordinator and both
//! engines so the deadline/cancellation logic is written once.

pub mod multi;
pub mod single;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Runs `tasks` concurrently, each producing one `T`, and collects
/// results as they arrive until either every task has finished or
/// `deadline` elapses — whichever comes first. Partial results are
/// returned on deadline rather than propagated as an error, matching
/// `ScrapeTimeout` (spec.md §7): a timed-out collection is not a failure.
pub async fn parallel_map_with_deadline<T, F, Fut>(
    items: Vec<T>,
    deadline: Duration,
    task: F,
) -> Vec<<Fut as std::future::Future>::Output>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future + Send + 'static,
    <Fut as std::future::Future>::Output: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(items.len().max(1));
    let task = std::sync::Arc::new(task);
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let tx = tx.clone();
        let task = std::sync::Arc::clone(&task);
        handles.push(tokio::spawn(async move {
            let result = task(item).await;
            let _ = tx.send(result).await;
        }));
    }
    drop(tx);

    let deadline_at = Instant::now() + deadline;
    let mut results = Vec::with_capacity(handles.len());
    loop {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline_at) => {
                for handle in &handles {
                    handle.abort();
                }
                break;
            }
            maybe = rx.recv() => {
                match maybe {
                    Some(result) => results.push(result),
                    None => break,
                }
            }
        }
    }
    results
}

/// Appends `_<lowercased unit>` to `name` unless `unit` is empty or
/// `name` already ends with that suffix, case-insensitively
/// (spec.md §4.E, "Name-with-unit rule").
pub fn metric_name_with_unit(name: &str, unit: &str) -> String {
    if unit.is_empty() {
        return name.to_string();
    }
    let suffix = format!("_{}", unit.to_lowercase());
    if name.to_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}
