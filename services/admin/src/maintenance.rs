//! Periodic expiry sweeps

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::password_reset::PasswordResetService;
use crate::sessions::SessionRegistry;

/// Counts removed by one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub reset_tokens: u64,
}

/// Removes expired sessions and reset tokens
#[derive(Clone)]
pub struct Maintenance {
    sessions: SessionRegistry,
    password_resets: PasswordResetService,
}

impl Maintenance {
    pub fn new(sessions: SessionRegistry, password_resets: PasswordResetService) -> Self {
        Self {
            sessions,
            password_resets,
        }
    }

    /// One sweep over both tables. A failure in one does not skip the other.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.sessions.sweep_expired().await {
            Ok(removed) => report.sessions = removed,
            Err(e) => error!("Failed to sweep expired sessions: {}", e),
        }
        match self.password_resets.sweep_expired().await {
            Ok(removed) => report.reset_tokens = removed,
            Err(e) => error!("Failed to sweep expired reset tokens: {}", e),
        }

        report
    }

    /// Schedule [`Maintenance::run_once`] on a six-field cron expression.
    /// The returned scheduler must be kept alive.
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        let maintenance = self.clone();
        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let maintenance = maintenance.clone();
            Box::pin(async move {
                let report = maintenance.run_once().await;
                info!(
                    sessions = report.sessions,
                    reset_tokens = report.reset_tokens,
                    "Expiry sweep finished"
                );
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started expiry sweeps with schedule: {}", schedule);
        Ok(scheduler)
    }
}
