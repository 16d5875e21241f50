//! When audit passes run.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum Schedule {
    /// Every N hours, starting one period after launch.
    Interval { hours: u32 },
    /// A `cron` crate expression (7 fields: sec min hour day month dow year).
    Cron(cron::Schedule),
}

impl Schedule {
    pub fn interval(hours: u32) -> Result<Self, String> {
        if hours == 0 {
            return Err("report interval must be at least one hour".to_string());
        }
        Ok(Schedule::Interval { hours })
    }

    pub fn cron(expr: &str) -> Result<Self, String> {
        cron::Schedule::from_str(expr)
            .map(Schedule::Cron)
            .map_err(|e| format!("Invalid cron: {}", e))
    }

    /// Next trigger strictly after `after`.
    pub fn next_run(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
        match self {
            Schedule::Interval { hours } => Ok(after + Duration::hours(i64::from(*hours))),
            Schedule::Cron(schedule) => schedule
                .after(&after)
                .next()
                .ok_or_else(|| "No future occurrence for cron".to_string()),
        }
    }

    /// "1 day(s)" / "6 hour(s)" / the cron expression.
    pub fn describe(&self) -> String {
        match self {
            Schedule::Interval { hours } if hours % 24 == 0 => {
                format!("every {} day(s)", hours / 24)
            }
            Schedule::Interval { hours } => format!("every {} hour(s)", hours),
            Schedule::Cron(schedule) => format!("on cron '{}'", schedule),
        }
    }
}
