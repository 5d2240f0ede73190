//! Weekly reminder queries.
//!
//! The crate does not run a scheduler. An external trigger (cron, systemd
//! timer, chat platform) uses [`ReminderSchedule`] to know when to fire and
//! [`weekly_digest`] / [`missed_reminder_due`] to know what to say.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use cron::Schedule;
use regex::Regex;
use serde::Serialize;

use crate::db::{Participant, RotationDb};
use crate::error::RotationError;
use crate::services::resolver::{self, ScheduledWeek};
use crate::types::ReminderDefaults;
use crate::week::WeekKey;

pub const SETTING_CHANNEL: &str = "reminder_channel";
pub const SETTING_DAY: &str = "reminder_day";
pub const SETTING_TIME: &str = "reminder_time";
pub const SETTING_TIMEZONE: &str = "reminder_timezone";

const DEFAULT_DAY: &str = "Monday";
const DEFAULT_TIME: &str = "09:00";
const DEFAULT_TIMEZONE: &str = "America/New_York";

/// A reminder for the current week is still worth sending this long after
/// the week started.
const MISSED_REMINDER_WINDOW_HOURS: i64 = 36;

const DAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

fn re_reminder_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap())
}

/// Validated weekly reminder slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSchedule {
    pub day: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl ReminderSchedule {
    /// Parse stored or user-supplied values. Blank inputs fall back to
    /// Monday, 09:00 and America/New_York.
    pub fn parse(day: &str, time: &str, timezone: &str) -> Result<Self, RotationError> {
        let day_input = non_blank(day, DEFAULT_DAY).to_lowercase();
        let day = DAYS
            .iter()
            .find(|(name, _)| *name == day_input)
            .map(|(_, weekday)| *weekday)
            .ok_or_else(|| RotationError::InvalidReminderDay(day.trim().to_string()))?;

        let time_input = non_blank(time, DEFAULT_TIME);
        let caps = re_reminder_time()
            .captures(time_input)
            .ok_or_else(|| RotationError::InvalidReminderTime(time_input.to_string()))?;
        let hour = caps[1]
            .parse()
            .map_err(|_| RotationError::InvalidReminderTime(time_input.to_string()))?;
        let minute = caps[2]
            .parse()
            .map_err(|_| RotationError::InvalidReminderTime(time_input.to_string()))?;

        let tz_input = non_blank(timezone, DEFAULT_TIMEZONE);
        let timezone: Tz = tz_input
            .parse()
            .map_err(|_| RotationError::InvalidTimezone(tz_input.to_string()))?;

        Ok(Self {
            day,
            hour,
            minute,
            timezone,
        })
    }

    /// Capitalized weekday name, e.g. `Monday`.
    pub fn day_name(&self) -> &'static str {
        match self.day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    /// `HH:MM`, zero padded.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    /// Five-field cron expression, e.g. `30 9 * * Tue`.
    pub fn cron_expression(&self) -> String {
        format!("{} {} * * {}", self.minute, self.hour, self.day)
    }

    pub fn schedule(&self) -> Result<Schedule, RotationError> {
        parse_cron(&self.cron_expression())
    }

    /// Next firing strictly after `after`, in UTC.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, RotationError> {
        let schedule = self.schedule()?;
        let next = schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .ok_or_else(|| RotationError::InvalidCron {
                expr: self.cron_expression(),
                reason: "no upcoming scheduled time".to_string(),
            })?;
        Ok(next.with_timezone(&Utc))
    }
}

fn non_blank<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

/// Parse a 5-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, RotationError> {
    // The cron crate wants a leading seconds field.
    let full_expr = format!("0 {}", expr);

    full_expr
        .parse::<Schedule>()
        .map_err(|e| RotationError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Settings
// =============================================================================

/// Write reminder defaults for keys that have no stored value yet.
/// Returns how many keys were written.
pub fn seed_defaults(db: &RotationDb, defaults: &ReminderDefaults) -> Result<usize, RotationError> {
    db.with_transaction(|db| {
        let mut written = 0;
        for (key, value) in [
            (SETTING_CHANNEL, defaults.channel.as_str()),
            (SETTING_DAY, defaults.day.as_str()),
            (SETTING_TIME, defaults.time.as_str()),
            (SETTING_TIMEZONE, defaults.timezone.as_str()),
        ] {
            if db.seed_setting(key, value)? {
                written += 1;
            }
        }
        Ok(written)
    })
}

/// Configured reminder channel; blank counts as unset.
pub fn channel(db: &RotationDb) -> Result<Option<String>, RotationError> {
    Ok(db
        .get_setting(SETTING_CHANNEL)?
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty()))
}

pub fn set_channel(db: &RotationDb, channel: &str) -> Result<(), RotationError> {
    let channel = channel.trim();
    if channel.is_empty() {
        return Err(RotationError::Configuration(
            "Reminder channel cannot be empty".to_string(),
        ));
    }
    db.set_setting(SETTING_CHANNEL, channel)?;
    log::info!("Reminder channel set to {}", channel);
    Ok(())
}

/// Stored reminder schedule, with defaults for missing keys.
pub fn load_schedule(db: &RotationDb) -> Result<ReminderSchedule, RotationError> {
    let day = db.get_setting(SETTING_DAY)?.unwrap_or_default();
    let time = db.get_setting(SETTING_TIME)?.unwrap_or_default();
    let timezone = db.get_setting(SETTING_TIMEZONE)?.unwrap_or_default();
    ReminderSchedule::parse(&day, &time, &timezone)
}

pub fn set_schedule(db: &RotationDb, schedule: &ReminderSchedule) -> Result<(), RotationError> {
    db.with_transaction(|db| {
        db.set_setting(SETTING_DAY, schedule.day_name())?;
        db.set_setting(SETTING_TIME, &schedule.time_label())?;
        db.set_setting(SETTING_TIMEZONE, schedule.timezone.name())?;
        log::info!(
            "Reminder schedule updated: {} {} {}",
            schedule.day_name(),
            schedule.time_label(),
            schedule.timezone.name()
        );
        Ok(())
    })
}

// =============================================================================
// Digest
// =============================================================================

/// What the weekly reminder should announce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDigest {
    pub channel: Option<String>,
    pub this_week: ScheduledWeek,
    pub next_week: ScheduledWeek,
    /// Administrators to alert. Only filled when neither week has anyone.
    pub alert_admins: Vec<Participant>,
}

impl WeeklyDigest {
    pub fn is_unassigned(&self) -> bool {
        self.this_week.assignee.is_none() && self.next_week.assignee.is_none()
    }
}

/// Resolve the current and next week (in that order) for the reminder.
pub fn weekly_digest(db: &RotationDb, now: DateTime<Utc>) -> Result<WeeklyDigest, RotationError> {
    db.with_transaction(|db| {
        let channel = channel(db)?;
        if channel.is_none() {
            log::warn!("Reminder channel is not configured");
        }

        let mut weeks = resolver::upcoming_schedule(db, WeekKey::of(now), 2)?.into_iter();
        let (Some(this_week), Some(next_week)) = (weeks.next(), weeks.next()) else {
            return Err(RotationError::Configuration(
                "schedule did not cover two weeks".to_string(),
            ));
        };

        let alert_admins = if this_week.assignee.is_none() && next_week.assignee.is_none() {
            log::warn!("No eligible assignee for week {}", this_week.week);
            db.list_admins()?
        } else {
            Vec::new()
        };

        Ok(WeeklyDigest {
            channel,
            this_week,
            next_week,
            alert_admins,
        })
    })
}

/// Whether a reminder for the current week should still go out, e.g. after
/// the trigger was down when it was due.
pub fn missed_reminder_due(db: &RotationDb, now: DateTime<Utc>) -> Result<bool, RotationError> {
    db.with_transaction(|db| {
        if channel(db)?.is_none() {
            return Ok(false);
        }

        let week = WeekKey::of(now);
        if resolver::resolve_week(db, week)?.is_none() {
            return Ok(false);
        }
        if db.get_assignment(week)?.is_none() {
            return Ok(false);
        }

        let age = now - week.start_instant();
        Ok(age <= Duration::hours(MISSED_REMINDER_WINDOW_HOURS))
    })
}
