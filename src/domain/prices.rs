//! Hourly price series and the adapter for external price feeds.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, SchedulingError};

/// One entry as delivered by a price feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time_label: String,
    pub price: f64,
}

impl PricePoint {
    pub fn new(time_label: impl Into<String>, price: f64) -> Self {
        Self {
            time_label: time_label.into(),
            price,
        }
    }
}

/// What to do when a feed returns fewer points than the planning horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShortSeriesPolicy {
    /// Fail with `MalformedInput`
    #[default]
    Reject,
    /// Repeat the last known price up to the horizon
    PadWithLast,
}

/// Validated hourly price sequence. Index `i` is the price during slot `i`;
/// the length is the planning horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct PriceSeries {
    prices: Vec<f64>,
}

impl PriceSeries {
    pub fn new(prices: Vec<f64>) -> Result<Self> {
        if prices.is_empty() {
            return Err(SchedulingError::malformed("price series is empty"));
        }
        if let Some((hour, price)) = prices
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0)
        {
            return Err(SchedulingError::malformed(format!(
                "price at hour {hour} must be a non-negative finite number, got {price}"
            )));
        }
        Ok(Self { prices })
    }

    /// Build a series of exactly `horizon` hours from feed points.
    ///
    /// Longer feeds keep their most recent `horizon` points. Shorter feeds are
    /// handled according to `policy`; they are never indexed past their end.
    pub fn from_points(
        points: &[PricePoint],
        horizon: usize,
        policy: ShortSeriesPolicy,
    ) -> Result<Self> {
        if horizon == 0 {
            return Err(SchedulingError::malformed("horizon must be at least one hour"));
        }
        let mut prices: Vec<f64> = points.iter().map(|p| p.price).collect();

        if prices.len() > horizon {
            tracing::info!(
                points = prices.len(),
                horizon,
                "price feed longer than horizon, keeping most recent points"
            );
            prices.drain(..prices.len() - horizon);
        } else if prices.len() < horizon {
            match policy {
                ShortSeriesPolicy::Reject => {
                    return Err(SchedulingError::malformed(format!(
                        "price feed has {} points, horizon needs {horizon}",
                        prices.len()
                    )));
                }
                ShortSeriesPolicy::PadWithLast => {
                    let last = *prices.last().ok_or_else(|| {
                        SchedulingError::malformed("price feed returned no points")
                    })?;
                    tracing::warn!(
                        points = prices.len(),
                        horizon,
                        pad_price = last,
                        "padding short price feed"
                    );
                    prices.resize(horizon, last);
                }
            }
        }

        Self::new(prices)
    }

    /// Mild midday-peak curve used when no live feed is available.
    pub fn synthetic(horizon: usize) -> Self {
        let prices = (0..horizon.max(1))
            .map(|h| {
                let hour_of_day = (h % 24) as f64;
                let base = 0.05 + 0.03 * (0.5 - ((hour_of_day - 12.0) / 12.0).abs());
                (base * 10_000.0).round() / 10_000.0
            })
            .collect();
        Self { prices }
    }

    pub fn horizon(&self) -> usize {
        self.prices.len()
    }

    pub fn price(&self, hour: usize) -> Option<f64> {
        self.prices.get(hour).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }

    pub fn mean(&self) -> f64 {
        self.prices.iter().sum::<f64>() / self.prices.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.prices.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.prices.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// max - min
    pub fn range(&self) -> f64 {
        self.max() - self.min()
    }

    /// Hours priced above mean + one sample standard deviation.
    pub fn peak_hours(&self) -> Vec<usize> {
        let n = self.prices.len();
        if n < 2 {
            return Vec::new();
        }
        let mean = self.mean();
        let variance =
            self.prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let threshold = mean + variance.sqrt();
        self.prices
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > threshold)
            .map(|(h, _)| h)
            .collect()
    }
}

impl TryFrom<Vec<f64>> for PriceSeries {
    type Error = SchedulingError;

    fn try_from(prices: Vec<f64>) -> Result<Self> {
        Self::new(prices)
    }
}

impl From<PriceSeries> for Vec<f64> {
    fn from(series: PriceSeries) -> Self {
        series.prices
    }
}
