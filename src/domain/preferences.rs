use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

/// Per-appliance comfort preferences, keyed by appliance name.
pub type Preferences = BTreeMap<String, Preference>;

/// Hours in which no appliance may run.
pub type RestrictedHours = BTreeSet<usize>;

/// How a single hour relates to an appliance's preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourClass {
    Avoided,
    Preferred,
    Neutral,
}

/// Soft scheduling preferences for one appliance.
///
/// An hour listed in both `avoid_hours` and `preferred_hours` is treated as
/// avoided only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Preference {
    #[serde(default)]
    pub avoid_hours: BTreeSet<usize>,
    #[serde(default = "default_avoid_penalty")]
    #[validate(range(min = 0.0, message = "avoid_penalty must be non-negative"))]
    pub avoid_penalty: f64,
    #[serde(default)]
    pub preferred_hours: BTreeSet<usize>,
    #[serde(default = "default_preferred_bonus")]
    #[validate(range(min = 0.0, message = "preferred_bonus must be non-negative"))]
    pub preferred_bonus: f64,
}

fn default_avoid_penalty() -> f64 {
    2.0
}

fn default_preferred_bonus() -> f64 {
    1.0
}

impl Default for Preference {
    fn default() -> Self {
        Self {
            avoid_hours: BTreeSet::new(),
            avoid_penalty: default_avoid_penalty(),
            preferred_hours: BTreeSet::new(),
            preferred_bonus: default_preferred_bonus(),
        }
    }
}

impl Preference {
    pub fn classify(&self, hour: usize) -> HourClass {
        if self.avoid_hours.contains(&hour) {
            HourClass::Avoided
        } else if self.preferred_hours.contains(&hour) {
            HourClass::Preferred
        } else {
            HourClass::Neutral
        }
    }

    /// Per-hour penalty used as a reward term: positive when avoided,
    /// negative (a bonus) when preferred.
    pub fn hourly_penalty(&self, hour: usize) -> f64 {
        match self.classify(hour) {
            HourClass::Avoided => self.avoid_penalty,
            HourClass::Preferred => -self.preferred_bonus,
            HourClass::Neutral => 0.0,
        }
    }

    /// Largest hour index mentioned anywhere in this preference.
    pub(crate) fn max_hour(&self) -> Option<usize> {
        self.avoid_hours
            .iter()
            .chain(self.preferred_hours.iter())
            .copied()
            .max()
    }

    pub(crate) fn weights_are_finite(&self) -> bool {
        self.avoid_penalty.is_finite() && self.preferred_bonus.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(avoid: &[usize], preferred: &[usize]) -> Preference {
        Preference {
            avoid_hours: avoid.iter().copied().collect(),
            preferred_hours: preferred.iter().copied().collect(),
            ..Preference::default()
        }
    }

    #[test]
    fn test_avoid_takes_precedence() {
        let p = pref(&[3, 4], &[4, 5]);
        assert_eq!(p.classify(3), HourClass::Avoided);
        assert_eq!(p.classify(4), HourClass::Avoided);
        assert_eq!(p.classify(5), HourClass::Preferred);
        assert_eq!(p.classify(6), HourClass::Neutral);
    }

    #[test]
    fn test_hourly_penalty() {
        let p = pref(&[1], &[2]);
        assert_eq!(p.hourly_penalty(1), 2.0);
        assert_eq!(p.hourly_penalty(2), -1.0);
        assert_eq!(p.hourly_penalty(0), 0.0);
    }

    #[test]
    fn test_defaults_from_json() {
        let p: Preference = serde_json::from_str(r#"{"avoid_hours":[22,23]}"#).unwrap();
        assert_eq!(p.avoid_penalty, 2.0);
        assert_eq!(p.preferred_bonus, 1.0);
        assert_eq!(p.max_hour(), Some(23));
    }

    #[test]
    fn test_negative_weights_rejected() {
        let p = Preference {
            avoid_penalty: -1.0,
            ..Preference::default()
        };
        assert!(p.validate().is_err());
    }
}
