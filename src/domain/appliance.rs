use serde::{Deserialize, Serialize};
use validator::Validate;

/// A schedulable household appliance.
///
/// `name` is the key used by schedules and preferences, so it must be unique
/// within one request (checked by [`super::SchedulingContext`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Appliance {
    #[validate(length(min = 1, message = "appliance name must not be empty"))]
    pub name: String,
    /// Power draw in kW
    #[validate(range(exclusive_min = 0.0, message = "power must be positive"))]
    pub power: f64,
    /// Required run time in whole hours
    #[validate(range(min = 1, message = "duration must be at least one hour"))]
    pub duration: usize,
}

impl Appliance {
    pub fn new(name: impl Into<String>, power: f64, duration: usize) -> Self {
        Self {
            name: name.into(),
            power,
            duration,
        }
    }

    /// Energy drawn over one hourly slot (kWh)
    pub fn energy_per_slot_kwh(&self) -> f64 {
        self.power
    }
}

/// Total appliance-hours a request asks for.
pub fn required_hours(appliances: &[Appliance]) -> usize {
    appliances.iter().map(|a| a.duration).sum()
}
