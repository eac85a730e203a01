// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::error::Error as StdError;

use anyhow::{anyhow, Context as _};
use embedded_hal::blocking::i2c;
use tracing::{debug, trace};

use crate::frame::{GridSize, ThermalFrame};

use super::settings::RefreshRate;

/// The operations a camera needs to provide frames to the poller.
///
/// All methods block; callers on an async runtime should run them on the blocking pool.
pub(crate) trait FrameSource {
    /// The dimensions of every frame this source produces.
    fn grid_size(&self) -> GridSize;

    /// Capture one full frame.
    fn read_frame(&mut self) -> anyhow::Result<ThermalFrame>;

    fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) -> anyhow::Result<()>;
}

impl<F> FrameSource for Box<F>
where
    F: FrameSource + ?Sized,
{
    fn grid_size(&self) -> GridSize {
        (**self).grid_size()
    }

    fn read_frame(&mut self) -> anyhow::Result<ThermalFrame> {
        (**self).read_frame()
    }

    fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) -> anyhow::Result<()> {
        (**self).set_refresh_rate(refresh_rate)
    }
}

/// An MLX90640 attached over I²C.
#[derive(Debug)]
pub(crate) struct Mlx90640Camera<I2C> {
    camera: mlx9064x::Mlx90640Driver<I2C>,
    grid_size: GridSize,
    temperature_buffer: Vec<f32>,
}

impl<I2C> Mlx90640Camera<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: 'static + StdError + Sync + Send,
    <I2C as i2c::Write>::Error: 'static + StdError + Sync + Send,
{
    pub(crate) fn new(camera: mlx9064x::Mlx90640Driver<I2C>) -> anyhow::Result<Self> {
        let grid_size = GridSize::new(camera.width(), camera.height())
            .context("MLX90640 reported an empty pixel grid")?;
        debug!(%grid_size, "Created MLX90640 camera");
        Ok(Self {
            camera,
            grid_size,
            temperature_buffer: vec![0f32; grid_size.count()],
        })
    }
}

impl<I2C> FrameSource for Mlx90640Camera<I2C>
where
    I2C: 'static + i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: 'static + StdError + Sync + Send,
    <I2C as i2c::Write>::Error: 'static + StdError + Sync + Send,
{
    fn grid_size(&self) -> GridSize {
        self.grid_size
    }

    fn read_frame(&mut self) -> anyhow::Result<ThermalFrame> {
        // Both subpages are needed for a full frame, and generate_image_to waits for each of them.
        self.camera
            .generate_image_to(&mut self.temperature_buffer)
            .context("Error reading a frame from the MLX90640")?;
        let ambient = self.camera.ambient_temperature();
        trace!(?ambient, "Read MLX90640 frame");
        let frame = ThermalFrame::new(self.grid_size, self.temperature_buffer.clone())?;
        Ok(frame.with_ambient(ambient))
    }

    fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) -> anyhow::Result<()> {
        let mlx_frame_rate = mlx9064x::FrameRate::try_from(refresh_rate.hertz())
            .map_err(|err| anyhow!("Invalid frame rate {}: {}", refresh_rate, err))?;
        self.camera
            .set_frame_rate(mlx_frame_rate)
            .context("Error setting camera frame rate")
    }
}
