//! Reconciliation scheduling for automatic runs.
//!
//! Computes the next run time for a configured frequency and drives the
//! timer loop that triggers runs through the [`RunCoordinator`].

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::coordinator::{RunCoordinator, TriggerResult};

/// Schedule frequency options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    /// Every hour, at the configured minute.
    Hourly,
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
}

impl std::fmt::Display for ScheduleFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for ScheduleFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            _ => Err(format!("Invalid schedule frequency: {s}")),
        }
    }
}

/// Configuration for the reconciliation schedule. Times are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Schedule frequency.
    pub frequency: ScheduleFrequency,
    /// Day of week for weekly (0=Sunday, 6=Saturday).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    /// Hour of day (0-23).
    pub hour_of_day: u8,
    /// Minute of hour (0-59).
    pub minute: u8,
    /// Whether the schedule is enabled.
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::new(ScheduleFrequency::Daily)
    }
}

impl ScheduleConfig {
    /// Create a new schedule configuration.
    #[must_use]
    pub fn new(frequency: ScheduleFrequency) -> Self {
        Self {
            frequency,
            day_of_week: None,
            hour_of_day: 23, // Default: 11 PM UTC
            minute: 0,
            enabled: true,
        }
    }

    /// Set day of week for weekly schedule.
    #[must_use]
    pub fn with_day_of_week(mut self, day: u8) -> Self {
        self.day_of_week = Some(day.min(6));
        self
    }

    /// Set hour of day.
    #[must_use]
    pub fn with_hour(mut self, hour: u8) -> Self {
        self.hour_of_day = hour.min(23);
        self
    }

    /// Set minute of hour.
    #[must_use]
    pub fn with_minute(mut self, minute: u8) -> Self {
        self.minute = minute.min(59);
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the schedule configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.hour_of_day > 23 {
            return Err(format!("hour_of_day out of range: {}", self.hour_of_day));
        }
        if self.minute > 59 {
            return Err(format!("minute out of range: {}", self.minute));
        }
        match self.frequency {
            ScheduleFrequency::Weekly if self.day_of_week.is_none() => {
                Err("day_of_week is required for weekly schedule".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Scheduler for reconciliation runs.
pub struct ReconciliationScheduler;

impl ReconciliationScheduler {
    /// Calculate the next run time strictly after `from`.
    #[must_use]
    pub fn calculate_next_run(
        config: &ScheduleConfig,
        from: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let target_time =
            NaiveTime::from_hms_opt(u32::from(config.hour_of_day), u32::from(config.minute), 0)?;

        match config.frequency {
            ScheduleFrequency::Hourly => Self::next_hourly(from, u32::from(config.minute)),
            ScheduleFrequency::Daily => Self::next_daily(from, target_time),
            ScheduleFrequency::Weekly => {
                let day = config.day_of_week.unwrap_or(0);
                Self::next_weekly(from, target_time, day)
            }
        }
    }

    /// Calculate next hourly run.
    fn next_hourly(from: DateTime<Utc>, minute: u32) -> Option<DateTime<Utc>> {
        let this_hour = from
            .date_naive()
            .and_time(NaiveTime::from_hms_opt(from.hour(), minute, 0)?)
            .and_utc();

        if from < this_hour {
            Some(this_hour)
        } else {
            Some(this_hour + Duration::hours(1))
        }
    }

    /// Calculate next daily run.
    fn next_daily(from: DateTime<Utc>, target_time: NaiveTime) -> Option<DateTime<Utc>> {
        let today_target = from.date_naive().and_time(target_time).and_utc();

        if from < today_target {
            Some(today_target)
        } else {
            let tomorrow = from.date_naive() + Duration::days(1);
            Some(tomorrow.and_time(target_time).and_utc())
        }
    }

    /// Calculate next weekly run.
    fn next_weekly(
        from: DateTime<Utc>,
        target_time: NaiveTime,
        day_of_week: u8,
    ) -> Option<DateTime<Utc>> {
        let target_weekday = match day_of_week {
            0 => Weekday::Sun,
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            _ => Weekday::Sat,
        };

        let current_weekday = from.weekday();
        let days_until = (i64::from(target_weekday.num_days_from_sunday())
            - i64::from(current_weekday.num_days_from_sunday())
            + 7)
            % 7;

        let mut target_date = from.date_naive() + Duration::days(days_until);
        let target_datetime = target_date.and_time(target_time).and_utc();

        if days_until == 0 && from >= target_datetime {
            // Same day but past the time, move to next week
            target_date += Duration::days(7);
            return Some(target_date.and_time(target_time).and_utc());
        }

        Some(target_datetime)
    }
}

/// Trigger runs on schedule until `shutdown` resolves.
///
/// A trigger that finds a run in progress is dropped.
pub async fn run_scheduler<F>(coordinator: Arc<RunCoordinator>, config: ScheduleConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    if !config.enabled {
        info!("Scheduled reconciliation disabled");
        return;
    }
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        let Some(next) = ReconciliationScheduler::calculate_next_run(&config, now) else {
            error!(?config, "Cannot compute next run time, scheduler stopped");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, frequency = %config.frequency, "Next scheduled reconciliation");

        tokio::select! {
            () = tokio::time::sleep(wait) => {
                match coordinator.trigger() {
                    TriggerResult::Accepted => info!("Scheduled reconciliation started"),
                    TriggerResult::Rejected => warn!("Scheduled reconciliation skipped, a run is in progress"),
                }
            }
            () = &mut shutdown => {
                info!("Scheduler shutting down");
                return;
            }
        }
    }
}
