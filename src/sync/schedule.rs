//! Recurring sync schedule
//!
//! [`SyncSchedule`] wraps a cron expression; [`ScheduleRunner`] waits for
//! each fire time and performs one run, strictly one after another, until a
//! shutdown signal arrives.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{AppError, ScheduleError};
use crate::sync::replicator::SyncReport;

/// Parsed cron expression
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl SyncSchedule {
    /// Parse a 5-field (minute precision) or 6/7-field cron expression
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            ScheduleError::InvalidExpression {
                expression: expression.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }

    /// Fire time following `last_fire`, or following `now` before the first fire
    ///
    /// The result lies in the past when a run outlasted it; such a fire is
    /// due immediately.
    pub fn next_fire<Tz: TimeZone>(
        &self,
        last_fire: Option<&DateTime<Tz>>,
        now: &DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        self.next_after(last_fire.unwrap_or(now))
    }
}

/// Something the schedule can run
#[async_trait]
pub trait Syncable: Send + Sync {
    async fn sync(&self) -> Result<SyncReport, AppError>;
}

/// Sequential runner for scheduled syncs
pub struct ScheduleRunner {
    schedule: SyncSchedule,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ScheduleRunner {
    pub fn new(schedule: SyncSchedule, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            schedule,
            shutdown_rx,
        }
    }

    /// Run until shutdown
    ///
    /// A run that overruns the next fire time delays it. Failed runs are
    /// reported by the syncable and do not stop the schedule.
    pub async fn run(mut self, syncable: &dyn Syncable) {
        info!(cron = %self.schedule.expression(), "Starting sync schedule");

        let mut last_fire: Option<DateTime<Local>> = None;

        loop {
            let now = Local::now();
            let Some(next) = self.schedule.next_fire(last_fire.as_ref(), &now) else {
                warn!(cron = %self.schedule.expression(), "Schedule has no upcoming fire time");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            debug!(next = %next.to_rfc3339(), wait_secs = wait.as_secs(), "Next sync scheduled");

            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync schedule");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    // A late fire stands in for every fire missed before it
                    last_fire = Some(next.max(Local::now()));
                    info!("Performing scheduled sync");
                    if let Err(err) = syncable.sync().await {
                        debug!(error = %err, "Scheduled sync failed, waiting for next fire time");
                    }
                }
            }
        }

        info!("Sync schedule stopped");
    }
}
