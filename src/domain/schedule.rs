use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{Appliance, PriceSeries, RestrictedHours};
use crate::error::{Result, SchedulingError, Shortfall};

/// Appliance name -> ordered set of scheduled hour indices.
///
/// A schedule may be partial; use [`Schedule::shortfalls`] before treating
/// it as complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    entries: BTreeMap<String, BTreeSet<usize>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty hour sets for every appliance, so unscheduled ones stay visible.
    pub fn for_appliances(appliances: &[Appliance]) -> Self {
        Self {
            entries: appliances
                .iter()
                .map(|a| (a.name.clone(), BTreeSet::new()))
                .collect(),
        }
    }

    pub fn insert_hour(&mut self, appliance: &str, hour: usize) {
        self.entries
            .entry(appliance.to_string())
            .or_default()
            .insert(hour);
    }

    pub fn set_hours(&mut self, appliance: impl Into<String>, hours: impl IntoIterator<Item = usize>) {
        self.entries
            .insert(appliance.into(), hours.into_iter().collect());
    }

    pub fn hours(&self, appliance: &str) -> Option<&BTreeSet<usize>> {
        self.entries.get(appliance)
    }

    /// Scheduled hours as a sorted vector, empty when the appliance is absent
    pub fn hours_vec(&self, appliance: &str) -> Vec<usize> {
        self.entries
            .get(appliance)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<usize>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appliances with fewer scheduled hours than their duration.
    pub fn shortfalls(&self, appliances: &[Appliance]) -> Vec<Shortfall> {
        appliances
            .iter()
            .filter_map(|a| {
                let scheduled = self.entries.get(&a.name).map_or(0, BTreeSet::len);
                (scheduled < a.duration).then(|| Shortfall {
                    appliance: a.name.clone(),
                    scheduled,
                    required: a.duration,
                })
            })
            .collect()
    }

    /// Every appliance runs exactly its duration and nothing lands on a
    /// restricted hour.
    pub fn is_feasible(&self, appliances: &[Appliance], restricted: &RestrictedHours) -> bool {
        appliances.iter().all(|a| {
            self.entries
                .get(&a.name)
                .is_some_and(|h| h.len() == a.duration && h.is_disjoint(restricted))
        })
    }

    /// Price-weighted energy cost of the scheduled hours.
    pub fn total_cost(&self, prices: &PriceSeries, appliances: &[Appliance]) -> Result<f64> {
        let mut total = 0.0;
        for appliance in appliances {
            let Some(hours) = self.entries.get(&appliance.name) else {
                continue;
            };
            for &hour in hours {
                let price = prices.price(hour).ok_or_else(|| {
                    SchedulingError::malformed(format!(
                        "'{}' scheduled at hour {hour}, outside the {}-hour horizon",
                        appliance.name,
                        prices.horizon()
                    ))
                })?;
                total += price * appliance.energy_per_slot_kwh();
            }
        }
        Ok(total)
    }
}

impl FromIterator<(String, BTreeSet<usize>)> for Schedule {
    fn from_iter<T: IntoIterator<Item = (String, BTreeSet<usize>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliances() -> Vec<Appliance> {
        vec![Appliance::new("Washer", 1.0, 2), Appliance::new("Dryer", 2.0, 1)]
    }

    #[test]
    fn test_shortfalls() {
        let mut schedule = Schedule::for_appliances(&appliances());
        schedule.insert_hour("Washer", 3);
        let shortfalls = schedule.shortfalls(&appliances());
        assert_eq!(shortfalls.len(), 2);
        assert_eq!(shortfalls[0].appliance, "Washer");
        assert_eq!(shortfalls[0].scheduled, 1);
        assert_eq!(shortfalls[1].scheduled, 0);
    }

    #[test]
    fn test_feasibility() {
        let restricted: RestrictedHours = [5].into_iter().collect();
        let mut schedule = Schedule::new();
        schedule.set_hours("Washer", [1, 2]);
        schedule.set_hours("Dryer", [4]);
        assert!(schedule.is_feasible(&appliances(), &restricted));

        schedule.set_hours("Dryer", [5]);
        assert!(!schedule.is_feasible(&appliances(), &restricted));
    }

    #[test]
    fn test_total_cost() {
        let prices = PriceSeries::new(vec![0.1, 0.2, 0.3]).unwrap();
        let mut schedule = Schedule::new();
        schedule.set_hours("Washer", [0, 1]);
        schedule.set_hours("Dryer", [2]);
        let cost = schedule.total_cost(&prices, &appliances()).unwrap();
        assert!((cost - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_total_cost_out_of_horizon() {
        let prices = PriceSeries::new(vec![0.1, 0.2]).unwrap();
        let mut schedule = Schedule::new();
        schedule.set_hours("Dryer", [7]);
        assert!(schedule.total_cost(&prices, &appliances()).is_err());
    }

    #[test]
    fn test_serializes_as_map() {
        let mut schedule = Schedule::new();
        schedule.set_hours("Washer", [3, 1]);
        assert_eq!(serde_json::to_string(&schedule).unwrap(), r#"{"Washer":[1,3]}"#);
    }
}
