// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::{Infallible, TryFrom};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::I2cdev;
use serde::Deserialize;

use crate::util::parse_int_decimal_hex;

/// An I²C bus, either by number (`/dev/i2c-N`) or by device path.
///
/// Strings that look like a decimal or `0x`-prefixed hex number are taken as a bus number.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(from = "RawBus")]
pub(crate) enum Bus {
    Number(u32),
    Path(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBus {
    Number(u32),
    Text(String),
}

impl From<RawBus> for Bus {
    fn from(raw: RawBus) -> Self {
        match raw {
            RawBus::Number(n) => Bus::Number(n),
            RawBus::Text(s) => match s.parse() {
                Ok(bus) => bus,
                Err(never) => match never {},
            },
        }
    }
}

impl Bus {
    pub(crate) fn device_path(&self) -> PathBuf {
        match self {
            Bus::Number(n) => PathBuf::from(format!("/dev/i2c-{}", n)),
            Bus::Path(p) => PathBuf::from(p),
        }
    }
}

impl FromStr for Bus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match parse_int_decimal_hex(s) {
            Ok(number) => Bus::Number(number),
            Err(_) => Bus::Path(s.to_string()),
        })
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_path().display())
    }
}

impl TryFrom<&Bus> for I2cdev {
    type Error = LinuxI2CError;

    fn try_from(bus: &Bus) -> Result<Self, Self::Error> {
        I2cdev::new(bus.device_path())
    }
}
