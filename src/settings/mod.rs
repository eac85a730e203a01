// SPDX-License-Identifier: GPL-3.0-or-later
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

mod cli;
mod statistics;

use crate::camera::{CameraSettings, RetrySettings};
use crate::mqtt::MqttSettings;
pub(crate) use cli::Args;
pub(crate) use statistics::StatisticsSettings;

fn default_update_interval() -> Duration {
    Duration::from_secs(60)
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(crate) struct Settings {
    /// How often a frame is read and its statistics published, in seconds.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_update_interval")]
    pub(crate) update_interval: Duration,

    /// Camera-specific settings.
    pub(crate) camera: CameraSettings,

    /// Which statistics to compute.
    #[serde(default)]
    pub(crate) statistics: StatisticsSettings,

    /// How failed frame reads are retried.
    #[serde(default)]
    pub(crate) retry: RetrySettings,

    /// MQTT server connection settings. Statistics are only logged if this is missing.
    #[serde(default)]
    pub(crate) mqtt: Option<MqttSettings>,
}

impl Settings {
    pub(crate) fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn validate(self) -> anyhow::Result<Self> {
        if self.update_interval == Duration::ZERO {
            return Err(anyhow!("update_interval must be greater than zero"));
        }
        // Surface a bad range now instead of when the pipeline starts.
        self.statistics.valid_range()?;
        if let Some(mqtt) = &self.mqtt {
            mqtt.validate()?;
        }
        Ok(self)
    }
}

impl FromStr for Settings {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()
    }
}
