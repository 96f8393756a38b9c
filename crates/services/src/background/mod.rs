//! Scheduled maintenance jobs.

use std::sync::Arc;

use bson::DateTime;
use chrono::{Duration, Utc};
use mongodb::Database;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{info, warn};

use crate::dao::device_token::DeviceTokenDao;

/// Starts the daily cleanup of device tokens that have stayed inactive past
/// the retention window. Returns the scheduler handle so the caller can keep
/// it alive for the process lifetime.
pub async fn start_scheduler(
    db: Database,
    token_retention_days: i64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let dao = Arc::new(DeviceTokenDao::new(&db));

    // 03:30 UTC daily, off the usual traffic peaks.
    scheduler
        .add(Job::new_async("0 30 3 * * *", move |_uuid, _lock| {
            let dao = dao.clone();
            Box::pin(async move {
                purge_stale_tokens(&dao, token_retention_days).await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    info!(token_retention_days, "Background scheduler started");
    Ok(scheduler)
}

async fn purge_stale_tokens(dao: &DeviceTokenDao, retention_days: i64) {
    let cutoff = Utc::now() - Duration::days(retention_days.max(1));
    let cutoff = DateTime::from_millis(cutoff.timestamp_millis());
    match dao.purge_inactive(cutoff).await {
        Ok(0) => {}
        Ok(purged) => info!(purged, "Purged long-inactive device tokens"),
        Err(e) => warn!(%e, "Device token purge failed"),
    }
}
