// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::anyhow;
use serde::Deserialize;

/// The dimensions of a camera's pixel grid.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
pub(crate) struct GridSize {
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl GridSize {
    /// The grid of the MLX90640, 32 columns by 24 rows.
    #[cfg(test)]
    pub(crate) const MLX90640: GridSize = GridSize {
        width: 32,
        height: 24,
    };

    pub(crate) fn new(width: usize, height: usize) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "a frame must have at least one pixel, got {}x{}",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    /// The number of readings in a frame of this size.
    pub(crate) fn count(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single capture from a thermal camera, in degrees Celsius, in row-major order.
///
/// The readings are shared and never modified after the frame is created, so cloning a frame is
/// cheap.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ThermalFrame {
    size: GridSize,
    readings: Arc<[f32]>,
    ambient: Option<f32>,
}

impl ThermalFrame {
    pub(crate) fn new(size: GridSize, readings: Vec<f32>) -> anyhow::Result<Self> {
        if readings.len() != size.count() {
            return Err(anyhow!(
                "a {} frame needs {} readings, but {} were given",
                size,
                size.count(),
                readings.len()
            ));
        }
        Ok(Self {
            size,
            readings: readings.into(),
            ambient: None,
        })
    }

    /// Create a single-row frame from a list of readings.
    #[cfg(test)]
    pub(crate) fn from_readings(readings: Vec<f32>) -> anyhow::Result<Self> {
        let size = GridSize::new(readings.len(), 1)?;
        Self::new(size, readings)
    }

    /// Attach the temperature of the sensor itself to this frame.
    pub(crate) fn with_ambient(mut self, ambient: Option<f32>) -> Self {
        self.ambient = ambient;
        self
    }

    pub(crate) fn size(&self) -> GridSize {
        self.size
    }

    /// The ambient temperature reported by the camera when this frame was captured, if known.
    pub(crate) fn ambient(&self) -> Option<f32> {
        self.ambient
    }

    pub(crate) fn readings(&self) -> &[f32] {
        &self.readings
    }
}

impl Deref for ThermalFrame {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        self.readings()
    }
}
