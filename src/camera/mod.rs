// SPDX-License-Identifier: GPL-3.0-or-later
mod i2c;
mod mock_camera;
mod retry;
mod settings;
mod thermal_camera;

pub(crate) use retry::{RetrySettings, RetryingReader};
pub(crate) use settings::{CameraSettings, RefreshRate};
pub(crate) use thermal_camera::FrameSource;

#[cfg(test)]
pub(crate) use i2c::Bus;
#[cfg(test)]
pub(crate) use mock_camera::{MockCamera, RepeatMode};
