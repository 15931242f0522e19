//! Bounded blocking wait on cluster jobs

use crate::backend::ClusterScheduler;
use crate::core::config::SchedulerSettings;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("jobs still active after {0:?}")]
    Timeout(Duration),

    #[error("scheduler queue query failed {0} times in a row")]
    SchedulerUnavailable(u32),
}

/// Polling interval and give-up bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub max_query_failures: u32,
}

impl WaitPolicy {
    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            max_wait: Duration::from_secs(settings.max_wait_secs),
            max_query_failures: settings.max_query_failures.max(1),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_settings(&SchedulerSettings::default())
    }
}

/// True once none of `ids` is in the active set
pub fn none_active(ids: &[String], active: &HashSet<String>) -> bool {
    ids.iter().all(|id| !active.contains(id))
}

/// True when the next poll would land past `max_wait`; an unrepresentable
/// poll time counts as past it
fn next_poll_exceeds(elapsed: Duration, policy: WaitPolicy) -> bool {
    elapsed
        .checked_add(policy.poll_interval)
        .map_or(true, |at| at > policy.max_wait)
}

/// Block until every id has left the scheduler queue.
///
/// `on_poll` is called after every successful query with the number of
/// awaited jobs still active.
pub async fn wait_for_jobs<F>(
    scheduler: &dyn ClusterScheduler,
    ids: &[String],
    policy: WaitPolicy,
    mut on_poll: F,
) -> Result<(), WaitError>
where
    F: FnMut(usize) + Send,
{
    if ids.is_empty() {
        return Ok(());
    }

    let started = Instant::now();
    let mut failures = 0u32;

    loop {
        match scheduler.active_jobs().await {
            Ok(active) => {
                failures = 0;
                if none_active(ids, &active) {
                    debug!("all {} awaited jobs finished", ids.len());
                    return Ok(());
                }
                let remaining = ids.iter().filter(|id| active.contains(*id)).count();
                on_poll(remaining);
            }
            Err(e) => {
                failures += 1;
                warn!("queue query failed ({}/{}): {}", failures, policy.max_query_failures, e);
                if failures >= policy.max_query_failures {
                    return Err(WaitError::SchedulerUnavailable(failures));
                }
            }
        }

        if next_poll_exceeds(started.elapsed(), policy) {
            return Err(WaitError::Timeout(policy.max_wait));
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}
