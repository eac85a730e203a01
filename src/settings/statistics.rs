// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use serde::Deserialize;

use crate::aggregate::{EnabledStatistics, ValidRange};
use crate::temperature::Temperature;

/// The bounds of a plausible reading, in any unit [`Temperature`] accepts.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
struct RangeSettings {
    min: Temperature,
    max: Temperature,
}

impl Default for RangeSettings {
    fn default() -> Self {
        let range = ValidRange::default();
        Self {
            min: Temperature::Celsius(range.min()),
            max: Temperature::Celsius(range.max()),
        }
    }
}

/// Which statistics are computed, and which readings are considered.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct StatisticsSettings {
    #[serde(flatten)]
    pub(crate) enabled: EnabledStatistics,

    #[serde(default)]
    valid_range: RangeSettings,
}

impl StatisticsSettings {
    /// The configured range of valid readings, converted to Celsius.
    pub(crate) fn valid_range(&self) -> anyhow::Result<ValidRange> {
        ValidRange::new(
            self.valid_range.min.in_celsius(),
            self.valid_range.max.in_celsius(),
        )
        .context("Invalid statistics.valid_range")
    }
}

#[cfg(test)]
mod test {
    use float_cmp::{approx_eq, F32Margin};

    use crate::aggregate::{EnabledStatistics, Statistic, ValidRange};

    use super::StatisticsSettings;

    #[test]
    fn defaults() {
        let parsed: StatisticsSettings = toml::from_str("").unwrap();
        assert_eq!(parsed, StatisticsSettings::default());
        assert_eq!(parsed.enabled, EnabledStatistics::default());
        assert_eq!(parsed.valid_range().unwrap(), ValidRange::default());
    }

    #[test]
    fn disable_some() {
        let source = r#"
        median_temperature = false
        mean_temperature = false
        "#;
        let parsed: StatisticsSettings = toml::from_str(source).unwrap();
        assert!(parsed.enabled.contains(Statistic::Minimum));
        assert!(parsed.enabled.contains(Statistic::Maximum));
        assert!(!parsed.enabled.contains(Statistic::Mean));
        assert!(!parsed.enabled.contains(Statistic::Median));
    }

    #[test]
    fn range_in_fahrenheit() {
        let source = r#"
        valid_range = { min = { fahrenheit = 32 }, max = { fahrenheit = 212 } }
        "#;
        let parsed: StatisticsSettings = toml::from_str(source).unwrap();
        let range = parsed.valid_range().unwrap();
        assert!(approx_eq!(f32, range.min(), 0.0, F32Margin::default()));
        assert!(approx_eq!(
            f32,
            range.max(),
            100.0,
            F32Margin::default().epsilon(1e-4)
        ));
    }

    #[test]
    fn inverted_range() {
        let source = r#"
        valid_range = { min = 50, max = 10 }
        "#;
        let parsed: StatisticsSettings = toml::from_str(source).unwrap();
        assert!(parsed.valid_range().is_err());
    }
}
