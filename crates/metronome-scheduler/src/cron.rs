//! Cron expression parsing and next-fire calculation.
//!
//! Schedules store standard 5-field Unix expressions
//! (minute hour day-of-month month day-of-week). The `cron` crate wants the
//! 7-field form, so expressions are converted by pinning seconds to `0` and
//! year to `*`. Anything other than exactly 5 fields is a validation error;
//! the job is rejected, never guessed at.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

use crate::error::{Result, SchedulerError};

/// Convert a 5-field Unix cron expression to the 7-field format expected by
/// the `cron` crate.
fn to_cron_crate_format(expression: &str) -> Result<String> {
    let field_count = expression.split_whitespace().count();
    if field_count != 5 {
        return Err(SchedulerError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: format!("expected 5 fields, got {field_count}"),
        });
    }
    Ok(format!("0 {} *", expression.split_whitespace().collect::<Vec<_>>().join(" ")))
}

fn parse_schedule(expression: &str) -> Result<CronSchedule> {
    let converted = to_cron_crate_format(expression)?;
    CronSchedule::from_str(&converted).map_err(|e| SchedulerError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_timezone(timezone: &str) -> Result<Tz> {
    timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))
}

/// Compute the next fire time after `after`, evaluated in `timezone` and
/// returned in UTC.
pub fn next_fire(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let schedule = parse_schedule(expression)?;
    let tz = parse_timezone(timezone)?;

    let local_after = after.with_timezone(&tz);
    let next_local = schedule.after(&local_after).next().ok_or_else(|| {
        SchedulerError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: "no future fire time".to_string(),
        }
    })?;

    Ok(next_local.with_timezone(&Utc))
}

/// Validate a cron expression without computing a fire time.
pub fn validate_cron_expression(expression: &str) -> Result<()> {
    parse_schedule(expression).map(|_| ())
}

/// Validate an IANA timezone name.
pub fn validate_timezone(timezone: &str) -> Result<()> {
    parse_timezone(timezone).map(|_| ())
}
