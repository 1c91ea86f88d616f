use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

// Defaults fit US equities on standard time. Override for other venues via
// MARKET_UTC_OFFSET_HOURS / MARKET_CLOSE_CUTOFF ("HH:MM").
const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

// If the run happens before this local time, outcomes for "today" cannot be
// final yet, so the previous session is the effective date. NYSE close is
// 16:00; we use a slightly conservative cutoff.
const DEFAULT_CLOSE_CUTOFF: (u32, u32) = (16, 30);

pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }

    let offset = chrono::FixedOffset::east_opt(utc_offset_hours() * 3600)
        .context("invalid market UTC offset")?;
    let now_local = now_utc.with_timezone(&offset);

    let cutoff_reached = (now_local.hour(), now_local.minute()) >= close_cutoff();
    let mut date = now_local.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    // Roll back to the previous session.
    let holidays = configured_holidays();
    while is_weekend(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

fn utc_offset_hours() -> i32 {
    std::env::var("MARKET_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|h| (-14..=14).contains(h))
        .unwrap_or(DEFAULT_UTC_OFFSET_HOURS)
}

fn close_cutoff() -> (u32, u32) {
    let Ok(s) = std::env::var("MARKET_CLOSE_CUTOFF") else {
        return DEFAULT_CLOSE_CUTOFF;
    };
    let mut parts = s.splitn(2, ':');
    let hour = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let minute = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    match (hour, minute) {
        (Some(h), Some(m)) if h < 24 && m < 60 => (h, m),
        _ => DEFAULT_CLOSE_CUTOFF,
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Minimal set of fixed-date full-closure holidays.
    // Extend via MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        if let Some(d) = NaiveDate::from_ymd_opt(y, 1, 1) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 7, 4) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 12, 25) {
            out.insert(d);
        }
    }

    if let Ok(s) = std::env::var("MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}
