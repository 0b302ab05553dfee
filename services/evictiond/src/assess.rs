//! Eviction assessment and retry scheduling.
//!
//! Both functions are pure: given the same pending tasks, observed status,
//! timeout, and instant, they always produce the same answer. All I/O and
//! logging stay in the controller.
//!
//! A task is finalized (dropped) when either:
//! - its grace window has expired — the safety net that guarantees no task
//!   blocks eviction forever, even with stuck or missing status data; or
//! - migration is confirmed — the task's cluster reports no healthy status
//!   while at least one other cluster does, so the workload is already
//!   serving elsewhere.

use std::collections::{HashMap, HashSet};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use fleet_api::{AggregatedStatusItem, EvictionTask};

/// Floor for any scheduled retry delay.
///
/// A deadline can slip into the past between assessing and scheduling within
/// one cycle; the floor keeps the resulting delay strictly positive.
pub const MIN_RETRY_DELAY: StdDuration = StdDuration::from_secs(1);

/// Decide which eviction tasks must stay pending.
///
/// Every task is judged independently against the single `now`. Duplicate
/// tasks for one cluster collapse to the earliest-created instance; the
/// output preserves the input order of the survivors and never carries two
/// tasks for the same cluster.
pub fn assess_eviction_tasks(
    tasks: &[EvictionTask],
    observed: &[AggregatedStatusItem],
    timeout: Duration,
    now: DateTime<Utc>,
) -> Vec<EvictionTask> {
    let healthy: HashSet<&str> = observed
        .iter()
        .filter(|item| item.is_healthy())
        .map(|item| item.cluster_name.as_str())
        .collect();
    let authoritative = authoritative_indices(tasks);

    tasks
        .iter()
        .enumerate()
        .filter(|(index, task)| {
            authoritative.contains(index) && keep_task(task, &healthy, timeout, now)
        })
        .map(|(_, task)| task.clone())
        .collect()
}

/// Delay until the next deadline among the kept tasks.
///
/// `None` iff `kept` is empty: the controller becomes event-driven again
/// until a new task appears. Otherwise the delay is strictly positive and
/// never exceeds the global timeout, even for tasks carrying a longer
/// per-task grace period.
pub fn next_retry(
    kept: &[EvictionTask],
    timeout: Duration,
    now: DateTime<Utc>,
) -> Option<StdDuration> {
    let min_remaining = kept
        .iter()
        .map(|task| deadline(task, timeout, now) - now)
        .min()?;

    let ceiling = timeout
        .to_std()
        .unwrap_or(StdDuration::ZERO)
        .max(MIN_RETRY_DELAY);
    let remaining = min_remaining.to_std().unwrap_or(StdDuration::ZERO);
    Some(remaining.clamp(MIN_RETRY_DELAY, ceiling))
}

fn keep_task(
    task: &EvictionTask,
    healthy: &HashSet<&str>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> bool {
    if now >= deadline(task, timeout, now) {
        return false;
    }
    // Fast path: the evicted cluster no longer reports healthy and some
    // other cluster does. With no healthy entry for this cluster, any
    // healthy entry at all is "elsewhere"; an empty status set can never
    // confirm migration.
    let migration_confirmed =
        !healthy.contains(task.cluster_name.as_str()) && !healthy.is_empty();
    !migration_confirmed
}

/// Deadline of a task. A task without a creation timestamp is malformed and
/// treated as already expired so one corrupt record cannot block the rest.
fn deadline(task: &EvictionTask, timeout: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(created) = task.created_at else {
        return now;
    };
    let grace = task.grace_period().unwrap_or(timeout);
    created.checked_add_signed(grace).unwrap_or(if grace < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Index of the authoritative task per cluster: earliest `created_at` wins,
/// a timestamped task beats a malformed one, ties keep the first occurrence.
fn authoritative_indices(tasks: &[EvictionTask]) -> HashSet<usize> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (index, task) in tasks.iter().enumerate() {
        match best.get(task.cluster_name.as_str()) {
            None => {
                best.insert(task.cluster_name.as_str(), index);
            }
            Some(&incumbent) => {
                if created_earlier(task, &tasks[incumbent]) {
                    best.insert(task.cluster_name.as_str(), index);
                }
            }
        }
    }
    best.into_values().collect()
}

fn created_earlier(candidate: &EvictionTask, incumbent: &EvictionTask) -> bool {
    match (candidate.created_at, incumbent.created_at) {
        (Some(candidate), Some(incumbent)) => candidate < incumbent,
        (Some(_), None) => true,
        _ => false,
    }
}
