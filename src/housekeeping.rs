//! Periodic cleanup of sessions and in-memory limiter state

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::auth::AuthService;
use crate::middleware::RateLimiter;
use crate::state::AppState;

/// Every ten minutes, on the minute
pub const SCHEDULE: &str = "0 */10 * * * *";

/// Rate-limit buckets idle for this long are forgotten
const IDLE_CLIENT_AGE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub sessions_purged: u64,
    pub clients_pruned: usize,
    pub throttle_entries_pruned: usize,
}

/// One cleanup pass. Database failures are logged and the pass carries on.
pub async fn run_once(auth: &AuthService, limiter: &RateLimiter) -> HousekeepingReport {
    let sessions_purged = match auth.purge_expired_sessions().await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(error = %e, "Session purge failed");
            0
        }
    };

    let report = HousekeepingReport {
        sessions_purged,
        clients_pruned: limiter.prune(IDLE_CLIENT_AGE).await,
        throttle_entries_pruned: auth.throttle().prune().await,
    };

    tracing::debug!(?report, "Housekeeping pass finished");
    report
}

/// Start the scheduler. Dropping the returned handle does not stop it.
pub async fn start(state: &AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let auth = state.auth_service.clone();
    let limiter = state.rate_limiter.clone();
    let job = Job::new_async(SCHEDULE, move |_id, _scheduler| {
        let auth = auth.clone();
        let limiter = limiter.clone();
        Box::pin(async move {
            run_once(&auth, &limiter).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = SCHEDULE, "Housekeeping scheduled");
    Ok(scheduler)
}
