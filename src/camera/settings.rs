// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::fmt;
use std::path::PathBuf;

use anyhow::Context as _;
use linux_embedded_hal::I2cdev;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde_repr::Deserialize_repr;
use tracing::info;

use crate::util::parse_int_decimal_hex;

use super::i2c::Bus;
use super::mock_camera::{MockCamera, RepeatMode};
use super::thermal_camera::{FrameSource, Mlx90640Camera};

/// The refresh rate codes for the MLX90640 control register.
///
/// Each step doubles the rate, starting from 0.5Hz.
#[derive(Clone, Copy, Debug, Deserialize_repr, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RefreshRate {
    HalfHertz = 0x00,
    OneHertz = 0x01,
    TwoHertz = 0x02,
    FourHertz = 0x03,
    EightHertz = 0x04,
    SixteenHertz = 0x05,
    ThirtyTwoHertz = 0x06,
    SixtyFourHertz = 0x07,
}

impl RefreshRate {
    pub(crate) fn code(&self) -> u8 {
        *self as u8
    }

    /// The number of subpages the camera captures per second.
    pub(crate) fn hertz(&self) -> f32 {
        0.5 * f32::from(1u8 << self.code())
    }
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self::EightHertz
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz (0x{:02x})", self.hertz(), self.code())
    }
}

fn default_mlx90640_address() -> u8 {
    0x33
}

/// Accept an I²C address as either an integer or a decimal/hex string.
fn deserialize_address<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum RawAddress {
        Number(u8),
        Text(String),
    }

    match RawAddress::deserialize(deserializer)? {
        RawAddress::Number(address) => Ok(address),
        RawAddress::Text(text) => parse_int_decimal_hex(&text).map_err(D::Error::custom),
    }
}

#[derive(Clone, Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub(crate) enum CameraSettings {
    Mlx90640 {
        bus: Bus,

        #[serde(
            default = "default_mlx90640_address",
            deserialize_with = "deserialize_address"
        )]
        address: u8,

        #[serde(default)]
        refresh_rate: RefreshRate,
    },
    #[serde(rename = "mock")]
    MockCamera {
        path: PathBuf,

        #[serde(default)]
        repeat_mode: RepeatMode,
    },
}

impl CameraSettings {
    pub(crate) fn refresh_rate(&self) -> RefreshRate {
        match self {
            Self::Mlx90640 { refresh_rate, .. } => *refresh_rate,
            Self::MockCamera { .. } => RefreshRate::default(),
        }
    }

    /// Open the configured camera.
    ///
    /// Any failure here (the bus can't be opened, the calibration data can't be read) means there
    /// is no camera to poll.
    pub(crate) fn create_camera(&self) -> anyhow::Result<Box<dyn FrameSource + Send>> {
        let mut camera: Box<dyn FrameSource + Send> = match self {
            Self::Mlx90640 { bus, address, .. } => {
                let i2c = I2cdev::try_from(bus)
                    .with_context(|| format!("Unable to connect to I2C bus {}", bus))?;
                let driver = mlx9064x::Mlx90640Driver::new(i2c, *address).with_context(|| {
                    format!("Unable to initialize MLX90640 at address 0x{:02x}", address)
                })?;
                Box::new(Mlx90640Camera::new(driver)?)
            }
            Self::MockCamera { path, repeat_mode } => {
                Box::new(MockCamera::from_path(path, *repeat_mode)?)
            }
        };
        let refresh_rate = self.refresh_rate();
        camera.set_refresh_rate(refresh_rate)?;
        info!(grid_size = %camera.grid_size(), %refresh_rate, "Camera ready");
        Ok(camera)
    }
}
