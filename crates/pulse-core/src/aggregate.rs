use crate::model::{RepoStatus, ScanCounters, ScanError};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// Oldest activity first. Repositories without any commit sort before
/// everything else; ties fall back to path, then name.
pub fn sort_statuses(statuses: &mut [RepoStatus]) {
    statuses.sort_by(compare_statuses);
}

fn compare_statuses(left: &RepoStatus, right: &RepoStatus) -> Ordering {
    // `None < Some(_)` already puts commit-less repositories first.
    left.last_commit_time
        .cmp(&right.last_commit_time)
        .then_with(|| left.path.cmp(&right.path))
        .then_with(|| left.name.cmp(&right.name))
}

pub fn counters(statuses: &[RepoStatus], errors: &[ScanError]) -> ScanCounters {
    let mut counters = ScanCounters {
        total_repos: statuses.len(),
        failed_repos: errors.len(),
        ..ScanCounters::default()
    };
    for status in statuses {
        if status.is_clean {
            counters.clean_repos += 1;
        } else {
            counters.dirty_repos += 1;
        }
        if status.is_ghost {
            counters.ghost_repos += 1;
        }
        if !status.is_in_sync() {
            counters.out_of_sync_repos += 1;
        }
    }
    counters
}

/// Counts recent commits authored on the UTC day of `now`, keyed by
/// `YYYY-MM-DD`. Days without commits are absent.
pub fn tally_daily_commits(statuses: &[RepoStatus], now: OffsetDateTime) -> BTreeMap<String, usize> {
    let today = utc_day(now);
    let count: usize = statuses
        .iter()
        .flat_map(|status| &status.recent_commits)
        .filter(|commit| utc_day(commit.timestamp) == today)
        .count();
    let mut tally = BTreeMap::new();
    if count > 0 {
        tally.insert(day_key(today), count);
    }
    tally
}

pub fn day_key(day: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    day.format(&format).unwrap_or_else(|_| day.to_string())
}

pub fn utc_day(when: OffsetDateTime) -> Date {
    when.to_offset(UtcOffset::UTC).date()
}
