// SPDX-License-Identifier: GPL-3.0-or-later
//! Summary statistics over a single thermal frame.
//!
//! [`aggregate`] is a pure function: it reads the frame, never modifies it, and keeps no state
//! between calls. Readings outside of the configured [`ValidRange`] (including NaN, the invalid
//! reading sentinel) are left out of every statistic.
use std::fmt;

use anyhow::anyhow;
use itertools::Itertools;
use serde::Deserialize;

use crate::error::AggregateError;
use crate::frame::{GridSize, ThermalFrame};

/// The statistics that can be computed for a frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Statistic {
    Minimum,
    Maximum,
    Mean,
    Median,
}

impl Statistic {
    pub(crate) const ALL: &'static [Statistic] = &[
        Statistic::Minimum,
        Statistic::Maximum,
        Statistic::Mean,
        Statistic::Median,
    ];

    /// The identifier used for this statistic in configuration files and MQTT topics.
    pub(crate) fn key(&self) -> &'static str {
        match self {
            Statistic::Minimum => "min_temperature",
            Statistic::Maximum => "max_temperature",
            Statistic::Mean => "mean_temperature",
            Statistic::Median => "median_temperature",
        }
    }

    /// A human readable name.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Statistic::Minimum => "Min Temperature",
            Statistic::Maximum => "Max Temperature",
            Statistic::Mean => "Mean Temperature",
            Statistic::Median => "Median Temperature",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which statistics are computed. Each one defaults to enabled.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub(crate) struct EnabledStatistics {
    pub(crate) min_temperature: bool,
    pub(crate) max_temperature: bool,
    pub(crate) mean_temperature: bool,
    pub(crate) median_temperature: bool,
}

impl EnabledStatistics {
    #[cfg(test)]
    pub(crate) fn none() -> Self {
        Self {
            min_temperature: false,
            max_temperature: false,
            mean_temperature: false,
            median_temperature: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, statistic: Statistic, enabled: bool) -> Self {
        match statistic {
            Statistic::Minimum => self.min_temperature = enabled,
            Statistic::Maximum => self.max_temperature = enabled,
            Statistic::Mean => self.mean_temperature = enabled,
            Statistic::Median => self.median_temperature = enabled,
        }
        self
    }

    pub(crate) fn contains(&self, statistic: Statistic) -> bool {
        match statistic {
            Statistic::Minimum => self.min_temperature,
            Statistic::Maximum => self.max_temperature,
            Statistic::Mean => self.mean_temperature,
            Statistic::Median => self.median_temperature,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Statistic> + '_ {
        Statistic::ALL
            .iter()
            .copied()
            .filter(move |statistic| self.contains(*statistic))
    }
}

impl Default for EnabledStatistics {
    fn default() -> Self {
        Self {
            min_temperature: true,
            max_temperature: true,
            mean_temperature: true,
            median_temperature: true,
        }
    }
}

/// The inclusive range of temperatures (in Celsius) a reading must fall within to be used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ValidRange {
    min: f32,
    max: f32,
}

impl ValidRange {
    /// The object temperature range of the MLX90640.
    pub(crate) const MLX90640: ValidRange = ValidRange {
        min: -40.0,
        max: 300.0,
    };

    pub(crate) fn new(min: f32, max: f32) -> anyhow::Result<Self> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(anyhow!("valid range bounds must be finite numbers"));
        }
        if min > max {
            return Err(anyhow!(
                "valid range minimum ({}) is greater than the maximum ({})",
                min,
                max
            ));
        }
        Ok(Self { min, max })
    }

    pub(crate) fn min(&self) -> f32 {
        self.min
    }

    pub(crate) fn max(&self) -> f32 {
        self.max
    }

    /// Whether a reading should be included. NaN and infinite values never are.
    pub(crate) fn contains(&self, reading: f32) -> bool {
        reading.is_finite() && reading >= self.min && reading <= self.max
    }
}

impl Default for ValidRange {
    fn default() -> Self {
        Self::MLX90640
    }
}

/// Everything [`aggregate`] needs to know, fixed once the camera has been set up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AggregatorConfig {
    expected_count: usize,
    enabled: EnabledStatistics,
    valid_range: ValidRange,
}

impl AggregatorConfig {
    pub(crate) fn new(grid: GridSize, enabled: EnabledStatistics, valid_range: ValidRange) -> Self {
        Self {
            expected_count: grid.count(),
            enabled,
            valid_range,
        }
    }

    pub(crate) fn expected_count(&self) -> usize {
        self.expected_count
    }
}

/// The statistics for a single frame.
///
/// A field is `None` if that statistic was disabled, or if there were no valid readings in the
/// frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct AggregateResult {
    pub(crate) min: Option<f32>,
    pub(crate) max: Option<f32>,
    pub(crate) mean: Option<f32>,
    pub(crate) median: Option<f32>,
    /// How many readings passed the validity filter.
    pub(crate) valid_count: usize,
}

impl AggregateResult {
    pub(crate) fn get(&self, statistic: Statistic) -> Option<f32> {
        match statistic {
            Statistic::Minimum => self.min,
            Statistic::Maximum => self.max,
            Statistic::Mean => self.mean,
            Statistic::Median => self.median,
        }
    }

    /// The statistics that have a value, in a fixed order.
    pub(crate) fn present(&self) -> impl Iterator<Item = (Statistic, f32)> + '_ {
        Statistic::ALL
            .iter()
            .filter_map(move |statistic| self.get(*statistic).map(|value| (*statistic, value)))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Compute the enabled statistics over the valid readings in `frame`.
pub(crate) fn aggregate(
    frame: &ThermalFrame,
    config: &AggregatorConfig,
) -> Result<AggregateResult, AggregateError> {
    let expected = config.expected_count();
    if frame.len() != expected {
        return Err(AggregateError::DimensionMismatch {
            expected,
            actual: frame.len(),
        });
    }
    let range = config.valid_range;
    let valid = || frame.iter().copied().filter(move |t| range.contains(*t));
    let mut result = AggregateResult {
        valid_count: valid().count(),
        ..AggregateResult::default()
    };
    if result.valid_count == 0 {
        return Ok(result);
    }
    let enabled = config.enabled;
    if enabled.min_temperature || enabled.max_temperature {
        if let Some((min, max)) = valid().minmax_by(|a, b| a.total_cmp(b)).into_option() {
            result.min = Some(min).filter(|_| enabled.min_temperature);
            result.max = Some(max).filter(|_| enabled.max_temperature);
        }
    }
    if enabled.mean_temperature {
        // Accumulate in f64, a full frame of f32s loses precision otherwise.
        let sum: f64 = valid().map(f64::from).sum();
        result.mean = Some((sum / result.valid_count as f64) as f32);
    }
    if enabled.median_temperature {
        let mut sorted: Vec<f32> = valid().collect();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        result.median = Some(median_of_sorted(&sorted));
    }
    Ok(result)
}

/// `sorted` must be non-empty and in ascending order.
fn median_of_sorted(sorted: &[f32]) -> f32 {
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[middle]
    } else {
        ((f64::from(sorted[middle - 1]) + f64::from(sorted[middle])) / 2.0) as f32
    }
}
