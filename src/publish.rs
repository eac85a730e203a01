// SPDX-License-Identifier: GPL-3.0-or-later
use async_trait::async_trait;
use tracing::{debug, info};

use crate::aggregate::{EnabledStatistics, Statistic};
use crate::temperature::{Temperature, TemperatureUnit};

/// Somewhere to send the statistics computed for each frame.
#[async_trait]
pub(crate) trait StatisticsSink: Send {
    /// Called once, before any values are published.
    async fn announce(&mut self) -> anyhow::Result<()>;

    /// Publish the latest value of a statistic.
    async fn publish(&mut self, statistic: Statistic, value: Temperature) -> anyhow::Result<()>;
}

#[async_trait]
impl<S> StatisticsSink for Box<S>
where
    S: StatisticsSink + ?Sized,
{
    async fn announce(&mut self) -> anyhow::Result<()> {
        (**self).announce().await
    }

    async fn publish(&mut self, statistic: Statistic, value: Temperature) -> anyhow::Result<()> {
        (**self).publish(statistic, value).await
    }
}

/// Convert a temperature to `unit` and format it with exactly `decimals` digits after the point.
pub(crate) fn format_temperature(value: Temperature, unit: TemperatureUnit, decimals: u8) -> String {
    let converted = value.as_unit(unit).rounded(decimals);
    format!("{:.*}", usize::from(decimals), converted.value())
}

/// Logs every statistic instead of sending it anywhere.
#[derive(Clone, Debug)]
pub(crate) struct LogSink {
    enabled: EnabledStatistics,
    unit: TemperatureUnit,
    accuracy_decimals: u8,
}

impl LogSink {
    pub(crate) fn new(enabled: EnabledStatistics) -> Self {
        Self {
            enabled,
            unit: TemperatureUnit::default(),
            accuracy_decimals: 1,
        }
    }
}

#[async_trait]
impl StatisticsSink for LogSink {
    async fn announce(&mut self) -> anyhow::Result<()> {
        let statistics: Vec<&str> = self.enabled.iter().map(|s| s.key()).collect();
        info!(?statistics, "No MQTT server configured, logging statistics");
        Ok(())
    }

    async fn publish(&mut self, statistic: Statistic, value: Temperature) -> anyhow::Result<()> {
        let formatted = format_temperature(value, self.unit, self.accuracy_decimals);
        info!(
            %statistic,
            value = %formatted,
            unit = self.unit.symbol(),
            "Frame statistic"
        );
        debug!(raw = ?value, "Unrounded value");
        Ok(())
    }
}
