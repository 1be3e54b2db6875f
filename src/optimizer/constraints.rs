use crate::domain::{available_hours, required_hours, Appliance, PriceSeries, RestrictedHours};
use crate::error::{Result, SchedulingError};

/// True when the request can be scheduled: the hours left after removing
/// restricted ones cover the total appliance-hours requested.
///
/// This is the aggregate check: it does not take advantage of the fact
/// that appliances may overlap, so it is conservative.
pub fn feasibility_check(
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted: &RestrictedHours,
) -> bool {
    ensure_feasible(prices, appliances, restricted).is_ok()
}

pub fn ensure_feasible(
    prices: &PriceSeries,
    appliances: &[Appliance],
    restricted: &RestrictedHours,
) -> Result<()> {
    let available = available_hours(prices, restricted);

    if let Some(appliance) = appliances.iter().find(|a| a.duration > available) {
        return Err(SchedulingError::Infeasible {
            required: appliance.duration,
            available,
            appliance: Some(appliance.name.clone()),
        });
    }

    let required = required_hours(appliances);
    if required > available {
        return Err(SchedulingError::Infeasible {
            required,
            available,
            appliance: None,
        });
    }
    Ok(())
}
