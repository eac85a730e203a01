// SPDX-License-Identifier: GPL-3.0-or-later
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::{debug, warn};

use crate::frame::{GridSize, ThermalFrame};

use super::settings::RefreshRate;
use super::thermal_camera::FrameSource;

const DEFAULT_ATTEMPTS: u32 = 3;

const DEFAULT_DELAY: Duration = Duration::from_millis(10);

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_delay() -> Duration {
    DEFAULT_DELAY
}

/// How hard to try when reading a frame fails.
#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub(crate) struct RetrySettings {
    /// The total number of reads attempted for one frame, including the first one.
    #[serde(default = "default_attempts")]
    pub(crate) attempts: u32,

    /// How long to wait after a failed read before trying again.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_delay", rename = "delay_ms")]
    pub(crate) delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// A [`FrameSource`] that retries failed reads of the source it wraps.
#[derive(Debug)]
pub(crate) struct RetryingReader<F> {
    source: F,
    settings: RetrySettings,
}

impl<F> RetryingReader<F>
where
    F: FrameSource,
{
    pub(crate) fn new(source: F, settings: RetrySettings) -> Self {
        Self { source, settings }
    }
}

impl<F> FrameSource for RetryingReader<F>
where
    F: FrameSource,
{
    fn grid_size(&self) -> GridSize {
        self.source.grid_size()
    }

    fn read_frame(&mut self) -> anyhow::Result<ThermalFrame> {
        // Zero attempts is treated as a single attempt.
        let attempts = self.settings.attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.source.read_frame() {
                Ok(frame) => {
                    if attempt > 1 {
                        debug!(attempt, "Frame read succeeded after retrying");
                    }
                    return Ok(frame);
                }
                Err(err) => {
                    warn!(attempt, attempts, "Failed to read frame: {:?}", err);
                    last_error = Some(err);
                    if attempt < attempts {
                        thread::sleep(self.settings.delay);
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| anyhow!("No frame read attempts were made"))
            .context(format!("Unable to read a frame after {} attempts", attempts)))
    }

    fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) -> anyhow::Result<()> {
        self.source.set_refresh_rate(refresh_rate)
    }
}
