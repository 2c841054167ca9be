//! Cron evaluation and misfire-policy resolution for `TriggerKind::Schedule`
//! (spec.md §4.7).
//!
//! The `cron` crate parses six-field expressions (seconds leading); stored
//! trigger definitions use the conventional five-field form, so a literal
//! `"0 "` is prepended before parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use engine::models::MisfirePolicy;

use crate::error::TriggerError;

const MAX_MISSED_OCCURRENCES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    At(DateTime<Utc>),
    AfterWindow,
}

fn parse_schedule(cron_expression: &str) -> Result<Schedule, TriggerError> {
    let six_field = format!("0 {cron_expression}");
    Schedule::from_str(&six_field).map_err(|e| TriggerError::InvalidCron(e.to_string()))
}

fn parse_timezone(timezone: &str) -> Result<Tz, TriggerError> {
    timezone.parse().map_err(|_| TriggerError::InvalidCron(format!("unknown timezone '{timezone}'")))
}

/// The next instant this schedule fires after `max(now, start_date)`, or
/// `AfterWindow` if that instant would fall on or after `end_date`.
pub fn get_next_run_time(
    cron_expression: &str,
    timezone: &str,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<NextRun, TriggerError> {
    let schedule = parse_schedule(cron_expression)?;
    let tz = parse_timezone(timezone)?;

    let floor = start_date.map(|d| d.max(now)).unwrap_or(now);
    let floor_in_tz = floor.with_timezone(&tz);

    match schedule.after(&floor_in_tz).next() {
        Some(candidate) => {
            let candidate_utc = candidate.with_timezone(&Utc);
            if let Some(end) = end_date {
                if candidate_utc >= end {
                    return Ok(NextRun::AfterWindow);
                }
            }
            Ok(NextRun::At(candidate_utc))
        }
        None => Ok(NextRun::AfterWindow),
    }
}

/// Every scheduled instant strictly between `since` and `until`, capped at
/// [`MAX_MISSED_OCCURRENCES`] so a schedule left unattended for a long time
/// can't make a single tick enumerate unboundedly.
pub fn missed_occurrences(
    cron_expression: &str,
    timezone: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, TriggerError> {
    let schedule = parse_schedule(cron_expression)?;
    let tz = parse_timezone(timezone)?;
    let since_in_tz = since.with_timezone(&tz);

    let occurrences = schedule
        .after(&since_in_tz)
        .take(MAX_MISSED_OCCURRENCES)
        .map(|d| d.with_timezone(&Utc))
        .take_while(|d| *d <= until)
        .collect();
    Ok(occurrences)
}

/// Resolve a set of missed occurrences against a misfire policy. `now` is
/// used as the single follow-up instant for `run_once`.
pub fn resolve(policy: MisfirePolicy, occurrences: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    match policy {
        MisfirePolicy::Skip => Vec::new(),
        MisfirePolicy::RunOnce => {
            if occurrences.is_empty() {
                Vec::new()
            } else {
                vec![now]
            }
        }
        MisfirePolicy::RunAll => occurrences.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_time_respects_end_date() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let result = get_next_run_time("*/5 * * * *", "UTC", None, Some(end), now).unwrap();
        // every-5-minute schedule's next firing is well past a 30-second window
        assert_eq!(result, NextRun::AfterWindow);
    }

    #[test]
    fn resolve_skip_drops_every_missed_occurrence() {
        let now = Utc::now();
        let occurrences = vec![now, now];
        assert!(resolve(MisfirePolicy::Skip, &occurrences, now).is_empty());
    }

    #[test]
    fn resolve_run_once_coalesces_to_a_single_instant() {
        let now = Utc::now();
        let occurrences = vec![now, now, now];
        assert_eq!(resolve(MisfirePolicy::RunOnce, &occurrences, now).len(), 1);
    }

    #[test]
    fn resolve_run_all_enqueues_one_per_missed_instant() {
        let now = Utc::now();
        let occurrences = vec![now, now, now];
        assert_eq!(resolve(MisfirePolicy::RunAll, &occurrences, now).len(), 3);
    }
}
