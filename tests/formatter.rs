use serde_json::json;
use smart_energy_scheduler::domain::{Appliance, Schedule};
use smart_energy_scheduler::engine::format_schedule;
use smart_energy_scheduler::utils::{format_raw_schedule, NOT_SCHEDULED};
use std::collections::BTreeMap;

#[test]
fn washer_example() {
    let schedule: Schedule = [("Washer".to_string(), [2, 3, 4, 10].into_iter().collect())]
        .into_iter()
        .collect();
    let readable = format_schedule(&schedule, &[Appliance::new("Washer", 1.0, 4)]);
    assert_eq!(readable["Washer"], "02:00–05:00, 10:00–11:00");
}

#[test]
fn empty_hours_use_sentinel() {
    let mut schedule = Schedule::new();
    schedule.set_hours("Dryer", []);
    let readable = format_schedule(&schedule, &[]);
    assert_eq!(readable["Dryer"], NOT_SCHEDULED);
}

#[test]
fn raw_schedule_reports_skipped_values() {
    let raw = BTreeMap::from([
        ("Washer".to_string(), vec![json!(10), json!("2"), json!(3), json!(4)]),
        ("Dryer".to_string(), vec![json!("late"), json!({"hour": 5})]),
    ]);
    let formatted = format_raw_schedule(&raw);
    assert_eq!(formatted.ranges["Washer"], "02:00–05:00, 10:00–11:00");
    assert_eq!(formatted.ranges["Dryer"], NOT_SCHEDULED);
    assert_eq!(formatted.warnings.len(), 2);
    assert!(formatted.warnings.iter().all(|w| w.starts_with("Dryer")));
}
