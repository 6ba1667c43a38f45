use std::time::Duration;
use time::OffsetDateTime;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Coarse "how long ago" label. Future timestamps read as "just now".
pub fn time_ago(when: Option<OffsetDateTime>, now: OffsetDateTime) -> String {
    let Some(when) = when else {
        return "never".to_string();
    };
    let elapsed = (now - when).whole_seconds();
    if elapsed < MINUTE {
        "just now".to_string()
    } else if elapsed < HOUR {
        format!("{}m ago", elapsed / MINUTE)
    } else if elapsed < DAY {
        format!("{}h ago", elapsed / HOUR)
    } else if elapsed < 30 * DAY {
        format!("{}d ago", elapsed / DAY)
    } else if elapsed < 365 * DAY {
        format!("{}mo ago", elapsed / (30 * DAY))
    } else {
        format!("{}y ago", elapsed / (365 * DAY))
    }
}

/// Millisecond-rounded duration: `0s`, `15ms`, `1.25s`, `2m3.5s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = (duration.as_micros() + 500) / 1000;
    if millis == 0 {
        return "0s".to_string();
    }
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let minutes = millis / 60_000;
    let rest = millis % 60_000;
    let seconds = trim_fraction(format!("{}.{:03}", rest / 1000, rest % 1000));
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

fn trim_fraction(value: String) -> String {
    value.trim_end_matches('0').trim_end_matches('.').to_string()
}
