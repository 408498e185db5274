//! Background job scheduling and workers

pub mod publish_scheduled;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::db::Database;

/// Initialize and start the job scheduler
pub async fn start_scheduler(db: Database) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Scheduled post publisher - run every minute
    let publisher_db = db.clone();
    let publisher_job = Job::new_async("0 * * * * *", move |_uuid, _l| {
        let db = publisher_db.clone();
        Box::pin(async move {
            if let Err(e) = publish_scheduled::publish_due(&db).await {
                tracing::error!("Scheduled post publisher error: {}", e);
            }
        })
    })?;
    scheduler.add(publisher_job).await?;

    // Expired refresh token purge - run daily at 3 AM
    let purge_db = db.clone();
    let purge_job = Job::new_async("0 0 3 * * *", move |_uuid, _l| {
        let db = purge_db.clone();
        Box::pin(async move {
            info!("Purging expired refresh tokens");
            match db.users().cleanup_expired_refresh_tokens().await {
                Ok(purged) if purged > 0 => info!("Purged {} expired refresh tokens", purged),
                Ok(_) => {}
                Err(e) => tracing::error!("Refresh token purge error: {}", e),
            }
        })
    })?;
    scheduler.add(purge_job).await?;

    scheduler.start().await?;

    info!("Job scheduler started");
    Ok(scheduler)
}
