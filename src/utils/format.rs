//! Human-readable schedule rendering
//!
//! Hour lists become sorted contiguous ranges, e.g. `[2, 3, 4, 10]` renders
//! as `"02:00–05:00, 10:00–11:00"`. The end of each range is exclusive.

use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{Appliance, Schedule};

pub const NOT_SCHEDULED: &str = "Not scheduled";

/// Formatted ranges plus any hour values that had to be skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattedSchedule {
    pub ranges: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

/// Render any collection of hours. Duplicates and ordering don't matter.
pub fn format_hours<I>(hours: I) -> String
where
    I: IntoIterator<Item = usize>,
{
    let ranges = hours
        .into_iter()
        .sorted_unstable()
        .dedup()
        .map(|h| (h, h + 1))
        .coalesce(|(start, end), (next_start, next_end)| {
            if next_start == end {
                Ok((start, next_end))
            } else {
                Err(((start, end), (next_start, next_end)))
            }
        })
        .map(|(start, end)| format!("{start:02}:00–{end:02}:00"))
        .join(", ");

    if ranges.is_empty() {
        NOT_SCHEDULED.to_string()
    } else {
        ranges
    }
}

/// One readable string per appliance. Appliances absent from the schedule
/// render as "Not scheduled"; schedule entries for unknown names are kept.
pub fn format_schedule(schedule: &Schedule, appliances: &[Appliance]) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = appliances
        .iter()
        .map(|a| (a.name.clone(), NOT_SCHEDULED.to_string()))
        .collect();
    for (name, hours) in schedule.iter() {
        out.insert(name.clone(), format_hours(hours.iter().copied()));
    }
    out
}

/// Format an untyped schedule, e.g. one read from JSON.
///
/// Accepts non-negative integers and numeric strings. Anything else is
/// skipped with a warning, which is both logged and returned.
pub fn format_raw_schedule(raw: &BTreeMap<String, Vec<Value>>) -> FormattedSchedule {
    let mut formatted = FormattedSchedule::default();
    for (name, values) in raw {
        let mut hours = Vec::with_capacity(values.len());
        for value in values {
            match parse_hour(value) {
                Some(h) => hours.push(h),
                None => {
                    warn!(appliance = %name, %value, "skipping malformed hour");
                    formatted
                        .warnings
                        .push(format!("{name}: skipped malformed hour {value}"));
                }
            }
        }
        formatted.ranges.insert(name.clone(), format_hours(hours));
    }
    formatted
}

fn parse_hour(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|h| usize::try_from(h).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(vec![2, 3, 4, 10], "02:00–05:00, 10:00–11:00")]
    #[case(vec![10, 4, 3, 2, 3], "02:00–05:00, 10:00–11:00")]
    #[case(vec![0], "00:00–01:00")]
    #[case(vec![22, 23], "22:00–24:00")]
    #[case(vec![], NOT_SCHEDULED)]
    fn test_format_hours(#[case] hours: Vec<usize>, #[case] expected: &str) {
        assert_eq!(format_hours(hours), expected);
    }

    #[test]
    fn test_format_schedule_includes_missing_appliances() {
        let mut schedule = Schedule::new();
        schedule.set_hours("Washer", [2, 3, 4, 10]);
        let appliances = vec![Appliance::new("Washer", 1.0, 4), Appliance::new("Dryer", 2.0, 1)];

        let readable = format_schedule(&schedule, &appliances);
        assert_eq!(readable["Washer"], "02:00–05:00, 10:00–11:00");
        assert_eq!(readable["Dryer"], NOT_SCHEDULED);
    }

    #[test]
    fn test_raw_schedule_skips_malformed() {
        let raw = BTreeMap::from([(
            "Washer".to_string(),
            vec![json!(2), json!("3"), json!("noon"), json!(-1), json!(4.0), json!(null)],
        )]);
        let formatted = format_raw_schedule(&raw);
        assert_eq!(formatted.ranges["Washer"], "02:00–05:00");
        assert_eq!(formatted.warnings.len(), 3);
    }
}
