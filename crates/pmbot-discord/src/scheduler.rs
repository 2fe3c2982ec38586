use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

/// Daily report times, evaluated in a fixed timezone.
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    schedule: Schedule,
    timezone: Tz,
    hours: Vec<u32>,
}

impl ReportSchedule {
    pub fn new(hours: &[u32], timezone: Tz) -> Result<Self> {
        let mut hours = hours.to_vec();
        hours.sort_unstable();
        hours.dedup();
        if hours.is_empty() {
            bail!("at least one report hour is required");
        }
        if let Some(hour) = hours.iter().find(|hour| **hour > 23) {
            bail!("report hour {hour} is outside 0..=23");
        }
        let expression = format!(
            "0 0 {} * * *",
            hours
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
        let schedule = Schedule::from_str(&expression)
            .with_context(|| format!("invalid report schedule '{expression}'"))?;
        Ok(Self {
            schedule,
            timezone,
            hours,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn hours(&self) -> &[u32] {
        &self.hours
    }

    /// First report instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|due| due.with_timezone(&Utc))
    }

    pub fn describe(&self) -> String {
        let times = self
            .hours
            .iter()
            .map(|hour| format!("{hour:02}:00"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{times} {}", self.timezone.name())
    }
}
