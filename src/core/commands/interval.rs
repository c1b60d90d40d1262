// Next-run computation for interval-triggered commands.
//
// Pure time arithmetic, all UTC. The scheduling side effects (persisting
// next_run, upserting the pending event) live in the command service; this
// module only answers "given this command, when should it fire next?".

use super::command_models::CustomCommand;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// How far past `from` we are willing to search for a slot that clears the
/// exclusion rules. Beyond this the configuration is unsatisfiable (for
/// example all 24 hours excluded) and scheduling fails instead of looping.
const MAX_LOOKAHEAD_DAYS: i64 = 366;

/// Compute the next fire time for an interval command.
///
/// The base is `last_run + interval`. A command that has never run fires at
/// `from + interval` when `grace_on_create` is set (fresh creations and
/// updates), or immediately otherwise. A base in the past clamps to `from`
/// so a long outage produces one catch-up run, not a backlog.
///
/// Returns `None` when the exclusion rules leave no slot inside the
/// lookahead horizon - a configuration error, reported by the caller.
pub fn next_run_time(
    cmd: &CustomCommand,
    from: DateTime<Utc>,
    grace_on_create: bool,
) -> Option<DateTime<Utc>> {
    let interval = Duration::minutes(i64::from(cmd.interval_minutes));

    let mut next = match cmd.last_run {
        Some(last) => last + interval,
        None if grace_on_create => from + interval,
        None => from,
    };
    if next < from {
        next = from;
    }

    let horizon = from + Duration::days(MAX_LOOKAHEAD_DAYS);
    loop {
        if next > horizon {
            return None;
        }
        if is_excluded_day(cmd, next) {
            next = start_of_next_day(next);
            continue;
        }
        if is_excluded_hour(cmd, next) {
            // Skip the excluded hour entirely, not just the current instant.
            next = start_of_next_hour(next);
            continue;
        }
        return Some(next);
    }
}

fn is_excluded_day(cmd: &CustomCommand, t: DateTime<Utc>) -> bool {
    // Weekday numbering: 0 = Sunday.
    let day = t.weekday().num_days_from_sunday() as u8;
    cmd.excluded_days.contains(&day)
}

fn is_excluded_hour(cmd: &CustomCommand, t: DateTime<Utc>) -> bool {
    cmd.excluded_hours.contains(&(t.hour() as u8))
}

fn start_of_next_day(t: DateTime<Utc>) -> DateTime<Utc> {
    let since_midnight = i64::from(t.time().num_seconds_from_midnight());
    t - Duration::seconds(since_midnight) - subsec(t) + Duration::days(1)
}

fn start_of_next_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let past_hour = i64::from(t.time().num_seconds_from_midnight() % 3600);
    t - Duration::seconds(past_hour) - subsec(t) + Duration::hours(1)
}

fn subsec(t: DateTime<Utc>) -> Duration {
    Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commands::command_models::TriggerKind;
    use chrono::TimeZone;

    fn interval_command(minutes: u32) -> CustomCommand {
        let mut cmd = CustomCommand::with_defaults(1, 1, None);
        cmd.trigger_kind = TriggerKind::Interval;
        cmd.interval_minutes = minutes;
        cmd.disabled = false;
        cmd
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn plain_interval_adds_the_interval() {
        let cmd = interval_command(60);
        let from = at(2024, 5, 6, 12, 0);

        assert_eq!(next_run_time(&cmd, from, true), Some(at(2024, 5, 6, 13, 0)));
    }

    #[test]
    fn first_run_without_grace_fires_immediately() {
        let cmd = interval_command(60);
        let from = at(2024, 5, 6, 12, 0);

        assert_eq!(next_run_time(&cmd, from, false), Some(from));
    }

    #[test]
    fn base_comes_from_last_run_when_present() {
        let mut cmd = interval_command(30);
        cmd.last_run = Some(at(2024, 5, 6, 12, 0));
        let from = at(2024, 5, 6, 12, 10);

        assert_eq!(next_run_time(&cmd, from, true), Some(at(2024, 5, 6, 12, 30)));
    }

    #[test]
    fn stale_last_run_clamps_to_now() {
        let mut cmd = interval_command(15);
        cmd.last_run = Some(at(2024, 5, 1, 0, 0));
        let from = at(2024, 5, 6, 12, 10);

        // One catch-up run at `from`, not a backlog of missed runs.
        assert_eq!(next_run_time(&cmd, from, true), Some(from));
    }

    #[test]
    fn excluded_hour_is_skipped_entirely() {
        let mut cmd = interval_command(60);
        cmd.excluded_hours = vec![14];
        // 13:30 + 60min = 14:30, inside the excluded hour.
        let from = at(2024, 5, 6, 13, 30);

        let next = next_run_time(&cmd, from, true).unwrap();
        assert_eq!(next, at(2024, 5, 6, 15, 0));
    }

    #[test]
    fn excluded_day_advances_to_next_midnight() {
        let mut cmd = interval_command(60);
        // 2024-05-06 is a Monday; 1 = Monday with 0 = Sunday numbering.
        cmd.excluded_days = vec![1];
        let from = at(2024, 5, 5, 23, 30);

        let next = next_run_time(&cmd, from, true).unwrap();
        // 00:30 Monday is excluded; the whole day is skipped.
        assert_eq!(next, at(2024, 5, 7, 0, 0));
    }

    #[test]
    fn consecutive_exclusions_compose() {
        let mut cmd = interval_command(60);
        cmd.excluded_days = vec![1];
        cmd.excluded_hours = vec![0, 1, 2];
        let from = at(2024, 5, 5, 23, 30);

        // Monday skipped to Tuesday 00:00, then hours 0-2 skipped.
        let next = next_run_time(&cmd, from, true).unwrap();
        assert_eq!(next, at(2024, 5, 7, 3, 0));
    }

    #[test]
    fn unsatisfiable_exclusions_fail_instead_of_looping() {
        let mut cmd = interval_command(60);
        cmd.excluded_hours = (0..24).collect();
        let from = at(2024, 5, 6, 12, 0);

        assert_eq!(next_run_time(&cmd, from, true), None);
    }

    #[test]
    fn all_days_excluded_fails_too() {
        let mut cmd = interval_command(60);
        cmd.excluded_days = (0..7).collect();
        let from = at(2024, 5, 6, 12, 0);

        assert_eq!(next_run_time(&cmd, from, true), None);
    }
}
