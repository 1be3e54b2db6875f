//! Comfort Scoring Model
//!
//! Turns a schedule plus user preferences into a single comfort value on a
//! 0-10 scale. The score is built per appliance from three additive tiers:
//!
//! 1. Cost efficiency (baseline 5.0): how the schedule's mean price compares
//!    with the horizon's mean, relative to the horizon's price range.
//! 2. Avoidance: share of scheduled hours inside `avoid_hours`, weighted by
//!    the appliance's `avoid_penalty` and a strength multiplier.
//! 3. Preference: share of scheduled hours inside `preferred_hours`, times a
//!    fixed bonus scale.
//!
//! Each appliance is clamped to `[0, 10]` and the final score is the mean
//! over appliances. An appliance with no scheduled hours scores a fixed low
//! sentinel instead of being skipped. The model is a pure function of its
//! inputs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{Appliance, HourClass, Preference, Preferences, PriceSeries, Schedule};
use crate::error::{Result, SchedulingError};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

const FLAT_PRICE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ComfortConfig {
    /// Cost tier value for a schedule priced exactly at the horizon mean
    #[validate(range(min = 0.0, max = 10.0))]
    pub baseline: f64,
    /// Cost tier swing for a schedule one full price range below the mean
    #[validate(range(min = 0.0))]
    pub cost_scale: f64,
    /// Multiplier applied to `avoid_penalty * violation_rate`
    #[validate(range(min = 0.0))]
    pub strength_multiplier: f64,
    /// Bonus for a schedule fully inside preferred hours
    #[validate(range(min = 0.0))]
    pub preferred_bonus_scale: f64,
    /// Score of an appliance that received no hours at all
    #[validate(range(min = 0.0, max = 10.0))]
    pub unscheduled_score: f64,
    /// Score when there is nothing to score
    #[validate(range(min = 0.0, max = 10.0))]
    pub neutral_score: f64,
}

impl ComfortConfig {
    /// Range checks plus finiteness, which the range rules let through for NaN.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        let weights = [
            self.baseline,
            self.cost_scale,
            self.strength_multiplier,
            self.preferred_bonus_scale,
            self.unscheduled_score,
            self.neutral_score,
        ];
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(SchedulingError::malformed("comfort weights must be finite"));
        }
        Ok(())
    }
}

impl Default for ComfortConfig {
    fn default() -> Self {
        Self {
            baseline: 5.0,
            cost_scale: 5.0,
            strength_multiplier: 3.0,
            preferred_bonus_scale: 5.0,
            unscheduled_score: 0.5,
            neutral_score: 5.0,
        }
    }
}

/// Per-appliance tier values, mostly useful for reports and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplianceComfort {
    pub appliance: String,
    pub scheduled_hours: usize,
    pub cost_tier: f64,
    pub avoid_penalty: f64,
    pub preferred_bonus: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComfortBreakdown {
    pub appliances: Vec<ApplianceComfort>,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ComfortModel {
    config: ComfortConfig,
}

impl ComfortModel {
    pub fn new(config: ComfortConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComfortConfig {
        &self.config
    }

    pub fn score(
        &self,
        schedule: &Schedule,
        preferences: &Preferences,
        prices: Option<&PriceSeries>,
        appliances: Option<&[Appliance]>,
    ) -> Result<f64> {
        self.breakdown(schedule, preferences, prices, appliances)
            .map(|b| b.score)
    }

    /// Score every appliance and the overall mean.
    ///
    /// With `appliances` given, exactly those appliances are scored (missing
    /// ones count as unscheduled); otherwise every appliance in the schedule.
    pub fn breakdown(
        &self,
        schedule: &Schedule,
        preferences: &Preferences,
        prices: Option<&PriceSeries>,
        appliances: Option<&[Appliance]>,
    ) -> Result<ComfortBreakdown> {
        self.config.check()?;
        for (name, preference) in preferences {
            preference.validate()?;
            if !preference.avoid_penalty.is_finite() || !preference.preferred_bonus.is_finite() {
                return Err(SchedulingError::malformed(format!(
                    "preference weights for '{name}' must be finite"
                )));
            }
        }

        let names: Vec<&str> = match appliances {
            Some(list) => list.iter().map(|a| a.name.as_str()).collect(),
            None => schedule.iter().map(|(name, _)| name.as_str()).collect(),
        };

        let default_preference = Preference::default();
        let mut scored = Vec::with_capacity(names.len());
        for name in names {
            let hours = schedule.hours_vec(name);
            let preference = preferences.get(name).unwrap_or(&default_preference);
            scored.push(self.score_appliance(name, &hours, preference, prices)?);
        }

        let score = if scored.is_empty() {
            self.config.neutral_score
        } else {
            scored.iter().map(|a| a.score).sum::<f64>() / scored.len() as f64
        };

        Ok(ComfortBreakdown {
            appliances: scored,
            score,
        })
    }

    fn score_appliance(
        &self,
        name: &str,
        hours: &[usize],
        preference: &Preference,
        prices: Option<&PriceSeries>,
    ) -> Result<ApplianceComfort> {
        if hours.is_empty() {
            return Ok(ApplianceComfort {
                appliance: name.to_string(),
                scheduled_hours: 0,
                cost_tier: 0.0,
                avoid_penalty: 0.0,
                preferred_bonus: 0.0,
                score: self.config.unscheduled_score,
            });
        }

        let cost_tier = match prices {
            Some(prices) => self.cost_tier(name, hours, prices)?,
            None => self.config.baseline,
        };

        let n = hours.len() as f64;
        let (mut avoided, mut preferred) = (0usize, 0usize);
        for &hour in hours {
            match preference.classify(hour) {
                HourClass::Avoided => avoided += 1,
                HourClass::Preferred => preferred += 1,
                HourClass::Neutral => {}
            }
        }

        let violation_rate = avoided as f64 / n;
        let avoid_penalty =
            violation_rate * preference.avoid_penalty * self.config.strength_multiplier;

        let coverage = preferred as f64 / n;
        let preferred_bonus = coverage * self.config.preferred_bonus_scale;

        let score = (cost_tier - avoid_penalty + preferred_bonus).clamp(MIN_SCORE, MAX_SCORE);

        Ok(ApplianceComfort {
            appliance: name.to_string(),
            scheduled_hours: hours.len(),
            cost_tier,
            avoid_penalty,
            preferred_bonus,
            score,
        })
    }

    fn cost_tier(&self, name: &str, hours: &[usize], prices: &PriceSeries) -> Result<f64> {
        let mut sum = 0.0;
        for &hour in hours {
            sum += prices.price(hour).ok_or_else(|| {
                SchedulingError::malformed(format!(
                    "'{name}' scheduled at hour {hour}, outside the {}-hour horizon",
                    prices.horizon()
                ))
            })?;
        }

        let range = prices.range();
        if range < FLAT_PRICE_EPSILON {
            return Ok(self.config.baseline);
        }

        let schedule_mean = sum / hours.len() as f64;
        let efficiency = (prices.mean() - schedule_mean) / range;
        Ok((self.config.baseline + efficiency * self.config.cost_scale).clamp(MIN_SCORE, MAX_SCORE))
    }
}
