//! Validated scheduling request.
//!
//! Everything downstream (optimizer, environment, comfort model) assumes the
//! invariants checked here, so malformed input is rejected before any solving
//! starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use super::{Appliance, Preferences, PricePoint, PriceSeries, RestrictedHours, ShortSeriesPolicy};
use crate::error::{Result, SchedulingError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingContext {
    pub prices: PriceSeries,
    pub appliances: Vec<Appliance>,
    #[serde(default)]
    pub restricted_hours: RestrictedHours,
    #[serde(default)]
    pub preferences: Preferences,
}

/// A request as it arrives from a caller: prices are raw feed points that
/// still need fitting to the planning horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub prices: Vec<PricePoint>,
    pub appliances: Vec<Appliance>,
    #[serde(default)]
    pub restricted_hours: RestrictedHours,
    #[serde(default)]
    pub preferences: Preferences,
}

impl SchedulingRequest {
    /// Fit the feed to `horizon` hours and validate the result.
    pub fn into_context(self, horizon: usize, short_series: ShortSeriesPolicy) -> Result<SchedulingContext> {
        let prices = PriceSeries::from_points(&self.prices, horizon, short_series)?;
        SchedulingContext::new(prices, self.appliances, self.restricted_hours, self.preferences)
    }
}

impl SchedulingContext {
    pub fn new(
        prices: PriceSeries,
        appliances: Vec<Appliance>,
        restricted_hours: RestrictedHours,
        preferences: Preferences,
    ) -> Result<Self> {
        let ctx = Self {
            prices,
            appliances,
            restricted_hours,
            preferences,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Re-check every invariant; used after deserializing a request.
    pub fn validate(&self) -> Result<()> {
        validate_appliances(&self.prices, &self.appliances)?;
        validate_restricted(&self.prices, &self.restricted_hours)?;
        validate_preferences(&self.prices, &self.appliances, &self.preferences)
    }

    pub fn horizon(&self) -> usize {
        self.prices.horizon()
    }

    /// Hours left once restricted hours are removed
    pub fn available_hours(&self) -> usize {
        available_hours(&self.prices, &self.restricted_hours)
    }
}

pub fn available_hours(prices: &PriceSeries, restricted: &RestrictedHours) -> usize {
    prices.horizon() - restricted.iter().filter(|h| **h < prices.horizon()).count()
}

pub fn validate_appliances(prices: &PriceSeries, appliances: &[Appliance]) -> Result<()> {
    if appliances.is_empty() {
        return Err(SchedulingError::malformed("no appliances to schedule"));
    }
    let mut seen = HashSet::with_capacity(appliances.len());
    for appliance in appliances {
        appliance.validate()?;
        if !appliance.power.is_finite() {
            return Err(SchedulingError::malformed(format!(
                "'{}' has non-finite power",
                appliance.name
            )));
        }
        if appliance.duration > prices.horizon() {
            return Err(SchedulingError::malformed(format!(
                "'{}' needs {} hours but the horizon is {} hours",
                appliance.name,
                appliance.duration,
                prices.horizon()
            )));
        }
        if !seen.insert(appliance.name.as_str()) {
            return Err(SchedulingError::malformed(format!(
                "duplicate appliance name '{}'",
                appliance.name
            )));
        }
    }
    Ok(())
}

pub fn validate_restricted(prices: &PriceSeries, restricted: &RestrictedHours) -> Result<()> {
    match restricted.iter().find(|h| **h >= prices.horizon()) {
        Some(hour) => Err(SchedulingError::malformed(format!(
            "restricted hour {hour} outside the {}-hour horizon",
            prices.horizon()
        ))),
        None => Ok(()),
    }
}

pub fn validate_preferences(
    prices: &PriceSeries,
    appliances: &[Appliance],
    preferences: &Preferences,
) -> Result<()> {
    for (name, preference) in preferences {
        preference.validate()?;
        if !preference.weights_are_finite() {
            return Err(SchedulingError::malformed(format!(
                "preference weights for '{name}' must be finite"
            )));
        }
        if let Some(hour) = preference.max_hour().filter(|h| *h >= prices.horizon()) {
            return Err(SchedulingError::malformed(format!(
                "preference hour {hour} for '{name}' outside the {}-hour horizon",
                prices.horizon()
            )));
        }
        if !appliances.is_empty() && !appliances.iter().any(|a| &a.name == name) {
            tracing::warn!(appliance = %name, "preference for unknown appliance ignored");
        }
    }
    Ok(())
}
