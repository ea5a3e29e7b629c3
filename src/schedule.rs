//! Day-of-week pause/stop scheduling, parsed from the `schedule_params`
//! config string.
//!
//! Grounded on `original_source/conf.cpp`'s schedule option shape (a list of
//! day/time/action windows); parsed here with `chrono::Weekday`/`NaiveTime`
//! rather than hand-rolled day/time arithmetic, matching the crate's use of
//! `chrono` for wall-clock handling elsewhere.

use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Pause,
    Stop,
}

#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub action: ScheduleAction,
    pub detect: bool,
}

/// Parses `schedule_params`: semicolon-separated entries of
/// `dow,HH:MM,HH:MM,pause|stop,detect|nodetect`. Malformed entries are
/// skipped rather than rejected, matching the "logged; default is
/// substituted" policy used for other schedule/cleandir config strings.
pub fn parse(schedule_params: &str) -> Vec<ScheduleEntry> {
    schedule_params
        .split(';')
        .filter_map(|entry| parse_entry(entry.trim()))
        .collect()
}

fn parse_entry(entry: &str) -> Option<ScheduleEntry> {
    if entry.is_empty() {
        return None;
    }
    let fields: Vec<&str> = entry.split(',').collect();
    if fields.len() != 5 {
        return None;
    }
    let day = parse_day(fields[0])?;
    let start = NaiveTime::parse_from_str(fields[1], "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(fields[2], "%H:%M").ok()?;
    let action = match fields[3] {
        "pause" => ScheduleAction::Pause,
        "stop" => ScheduleAction::Stop,
        _ => return None,
    };
    let detect = fields[4] != "nodetect";
    Some(ScheduleEntry { day, start, end, action, detect })
}

fn parse_day(s: &str) -> Option<Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Returns the action (and its `detect` sub-flag) in effect at `now`, if any
/// entry's day/time window matches.
pub fn active_action(entries: &[ScheduleEntry], now: DateTime<Local>) -> Option<(ScheduleAction, bool)> {
    let day = now.weekday();
    let t = now.time();
    entries
        .iter()
        .find(|e| e.day == day && t >= e.start && t < e.end)
        .map(|e| (e.action, e.detect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_well_formed_entries_and_skips_malformed() {
        let entries = parse("mon,08:00,17:00,pause,nodetect;garbage;tue,09:00,10:00,stop,detect");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].day, Weekday::Mon);
        assert_eq!(entries[0].action, ScheduleAction::Pause);
        assert!(!entries[0].detect);
        assert_eq!(entries[1].action, ScheduleAction::Stop);
    }

    #[test]
    fn active_action_matches_day_and_time_window() {
        let entries = parse("mon,08:00,17:00,pause,nodetect");
        let inside = Local.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap(); // a Monday
        let outside = Local.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap();
        assert_eq!(active_action(&entries, inside), Some((ScheduleAction::Pause, false)));
        assert_eq!(active_action(&entries, outside), None);
    }
}
